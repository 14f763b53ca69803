//! Local button menu.
//!
//! A two-state machine driven by typed events from a debounced button.
//! A short press opens the menu or advances the selection; holding the
//! button past the long-press threshold activates the selected item; ten
//! seconds without input closes the menu without activating.

use std::time::Duration;

use tokio::time::Instant;

use crate::types::CommandKind;

/// Debounce interval: level changes bouncier than this are ignored.
pub const DEBOUNCE: Duration = Duration::from_millis(20);

/// Press-and-hold threshold separating short from long presses.
pub const LONG_PRESS: Duration = Duration::from_millis(800);

/// Inactivity timeout after which a visible menu closes.
pub const MENU_TIMEOUT: Duration = Duration::from_secs(10);

/// The fixed, ordered set of menu items.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Start,
    Stop,
    Run10Min,
    Run20Min,
    Run30Min,
    Run90Min,
    QueryStatus,
}

impl MenuItem {
    pub const ALL: [Self; 7] = [
        Self::Start,
        Self::Stop,
        Self::Run10Min,
        Self::Run20Min,
        Self::Run30Min,
        Self::Run90Min,
        Self::QueryStatus,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Run10Min => "RUN 10min",
            Self::Run20Min => "RUN 20min",
            Self::Run30Min => "RUN 30min",
            Self::Run90Min => "RUN 90min",
            Self::QueryStatus => "QUERY STATUS",
        }
    }

    /// The command this item submits. Zero minutes means "sender preset".
    pub fn command(self) -> (CommandKind, u8) {
        match self {
            Self::Start => (CommandKind::Start, 0),
            Self::Stop => (CommandKind::Stop, 0),
            Self::Run10Min => (CommandKind::RunMinutes, 10),
            Self::Run20Min => (CommandKind::RunMinutes, 20),
            Self::Run30Min => (CommandKind::RunMinutes, 30),
            Self::Run90Min => (CommandKind::RunMinutes, 90),
            Self::QueryStatus => (CommandKind::QueryStatus, 0),
        }
    }
}

/// Typed button events after debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
}

/// Turns a raw button level into [`ButtonEvent`]s.
///
/// Events fire on release; the press duration decides short versus long.
#[derive(Debug)]
pub struct Debouncer {
    level: bool,
    last_change: Instant,
    pressed_at: Option<Instant>,
}

impl Debouncer {
    pub fn new(now: Instant) -> Self {
        Self {
            level: false,
            last_change: now,
            pressed_at: None,
        }
    }

    /// Feed the sampled button level; `true` means pressed.
    pub fn sample(&mut self, pressed: bool, now: Instant) -> Option<ButtonEvent> {
        if pressed == self.level {
            return None;
        }
        if now - self.last_change < DEBOUNCE {
            return None;
        }
        self.level = pressed;
        self.last_change = now;

        if pressed {
            self.pressed_at = Some(now);
            return None;
        }

        let held = now - self.pressed_at.take()?;
        if held >= LONG_PRESS {
            Some(ButtonEvent::LongPress)
        } else {
            Some(ButtonEvent::ShortPress)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MenuState {
    #[default]
    Hidden,
    Visible,
}

/// The menu proper.
#[derive(Debug)]
pub struct Menu {
    state: MenuState,
    selected: usize,
    opened_at: Option<Instant>,
    activated: Option<MenuItem>,
}

impl Menu {
    pub fn new() -> Self {
        Self {
            state: MenuState::Hidden,
            selected: 0,
            opened_at: None,
            activated: None,
        }
    }

    pub fn state(&self) -> MenuState {
        self.state
    }

    pub fn selected_item(&self) -> MenuItem {
        MenuItem::ALL[self.selected]
    }

    /// Apply one button event. Transitions are total: every event in every
    /// state has a defined outcome.
    pub fn handle_event(&mut self, event: ButtonEvent, now: Instant) {
        match (self.state, event) {
            (MenuState::Hidden, ButtonEvent::ShortPress) => self.show(now),
            (MenuState::Hidden, ButtonEvent::LongPress) => {}
            (MenuState::Visible, ButtonEvent::ShortPress) => {
                self.selected = (self.selected + 1) % MenuItem::ALL.len();
                self.opened_at = Some(now);
            }
            (MenuState::Visible, ButtonEvent::LongPress) => {
                self.activated = Some(self.selected_item());
                self.hide();
            }
        }
    }

    /// Close the menu if it has sat inactive past the timeout.
    pub fn tick(&mut self, now: Instant) {
        if self.state == MenuState::Visible {
            if let Some(opened) = self.opened_at {
                if now - opened > MENU_TIMEOUT {
                    self.hide();
                }
            }
        }
    }

    /// Take the activated item, if a long press selected one. Returns the
    /// item at most once per activation.
    pub fn take_activated(&mut self) -> Option<MenuItem> {
        self.activated.take()
    }

    fn show(&mut self, now: Instant) {
        self.state = MenuState::Visible;
        self.selected = 0;
        self.opened_at = Some(now);
    }

    fn hide(&mut self) {
        self.state = MenuState::Hidden;
        self.opened_at = None;
    }
}

impl Default for Menu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> (Menu, Instant) {
        (Menu::new(), Instant::now())
    }

    #[tokio::test(start_paused = true)]
    async fn short_press_opens_at_first_item() {
        let (mut menu, now) = start();
        menu.handle_event(ButtonEvent::ShortPress, now);
        assert_eq!(menu.state(), MenuState::Visible);
        assert_eq!(menu.selected_item(), MenuItem::Start);
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_in_hidden_does_nothing() {
        let (mut menu, now) = start();
        menu.handle_event(ButtonEvent::LongPress, now);
        assert_eq!(menu.state(), MenuState::Hidden);
        assert!(menu.take_activated().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn selection_wraps_at_the_last_item() {
        let (mut menu, now) = start();
        menu.handle_event(ButtonEvent::ShortPress, now);
        for _ in 0..MenuItem::ALL.len() - 1 {
            menu.handle_event(ButtonEvent::ShortPress, now);
        }
        assert_eq!(menu.selected_item(), MenuItem::QueryStatus);
        menu.handle_event(ButtonEvent::ShortPress, now);
        assert_eq!(menu.selected_item(), MenuItem::Start);
    }

    #[tokio::test(start_paused = true)]
    async fn long_press_activates_and_hides() {
        let (mut menu, now) = start();
        menu.handle_event(ButtonEvent::ShortPress, now);
        menu.handle_event(ButtonEvent::ShortPress, now);
        menu.handle_event(ButtonEvent::LongPress, now);

        assert_eq!(menu.state(), MenuState::Hidden);
        assert_eq!(menu.take_activated(), Some(MenuItem::Stop));
        // Consumed exactly once.
        assert!(menu.take_activated().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn inactivity_closes_without_activating() {
        let (mut menu, now) = start();
        menu.handle_event(ButtonEvent::ShortPress, now);
        menu.tick(now + MENU_TIMEOUT + Duration::from_millis(1));
        assert_eq!(menu.state(), MenuState::Hidden);
        assert!(menu.take_activated().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn short_press_resets_the_timeout() {
        let (mut menu, now) = start();
        menu.handle_event(ButtonEvent::ShortPress, now);
        let later = now + Duration::from_secs(9);
        menu.handle_event(ButtonEvent::ShortPress, later);
        // 9s + 9s without the reset would have closed it.
        menu.tick(later + Duration::from_secs(9));
        assert_eq!(menu.state(), MenuState::Visible);
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_ignores_contact_bounce() {
        let now = Instant::now();
        let mut btn = Debouncer::new(now);

        let t0 = now + Duration::from_millis(100);
        assert!(btn.sample(true, t0).is_none());
        // Bounce inside the window is ignored entirely.
        assert!(btn.sample(false, t0 + Duration::from_millis(5)).is_none());
        assert!(btn.sample(true, t0 + Duration::from_millis(8)).is_none());

        // Clean release after 100 ms: a short press.
        let t1 = t0 + Duration::from_millis(100);
        assert_eq!(btn.sample(false, t1), Some(ButtonEvent::ShortPress));
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_reports_long_press_on_release() {
        let now = Instant::now();
        let mut btn = Debouncer::new(now);

        let t0 = now + Duration::from_millis(100);
        assert!(btn.sample(true, t0).is_none());
        let t1 = t0 + LONG_PRESS + Duration::from_millis(50);
        assert_eq!(btn.sample(false, t1), Some(ButtonEvent::LongPress));
    }
}
