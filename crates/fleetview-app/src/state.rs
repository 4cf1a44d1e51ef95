// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::{AppMode, FormKind, Role, ScreenKind, SessionUser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    pub mode: AppMode,
    pub role: Role,
    pub active_screen: ScreenKind,
    pub user: Option<SessionUser>,
    pub status_line: Option<String>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::for_role(Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    NextScreen,
    PrevScreen,
    OpenScreen(ScreenKind),
    EnterFilter,
    ExitToNav,
    OpenForm(FormKind),
    FormSubmitted(FormKind),
    SignIn(SessionUser),
    SignOut,
    SetStatus(String),
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    ModeChanged(AppMode),
    ScreenChanged(ScreenKind),
    RoleChanged(Role),
    SessionChanged(Option<String>),
    FormSubmitted(FormKind),
    StatusUpdated(String),
    StatusCleared,
}

impl AppState {
    pub fn for_role(role: Role) -> Self {
        Self {
            mode: AppMode::Nav,
            role,
            active_screen: role.landing_screen(),
            user: None,
            status_line: None,
        }
    }

    pub fn screens(&self) -> &'static [ScreenKind] {
        ScreenKind::for_role(self.role)
    }

    pub fn dispatch(&mut self, command: AppCommand) -> Vec<AppEvent> {
        match command {
            AppCommand::NextScreen => self.rotate_screen(1),
            AppCommand::PrevScreen => self.rotate_screen(-1),
            AppCommand::OpenScreen(screen) => {
                if !screen.visible_to(self.role) {
                    let message = format!(
                        "{} is not available to {}",
                        screen.label(),
                        self.role.label()
                    );
                    return vec![self.set_status(&message)];
                }
                if screen == self.active_screen {
                    return Vec::new();
                }
                self.active_screen = screen;
                vec![AppEvent::ScreenChanged(screen)]
            }
            AppCommand::EnterFilter => {
                self.mode = AppMode::Filter;
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::ExitToNav => {
                self.mode = AppMode::Nav;
                vec![AppEvent::ModeChanged(self.mode), self.set_status("nav")]
            }
            AppCommand::OpenForm(kind) => {
                self.mode = AppMode::Form(kind);
                vec![AppEvent::ModeChanged(self.mode)]
            }
            AppCommand::FormSubmitted(kind) => {
                self.mode = AppMode::Nav;
                vec![
                    AppEvent::ModeChanged(self.mode),
                    AppEvent::FormSubmitted(kind),
                    self.set_status(&format!("{} saved", kind.label())),
                ]
            }
            AppCommand::SignIn(user) => {
                let role = user.role;
                let message = format!("signed in as {}", user.email);
                self.user = Some(user);
                self.mode = AppMode::Nav;
                let mut events = vec![AppEvent::SessionChanged(
                    self.user.as_ref().map(|user| user.email.clone()),
                )];
                if role != self.role {
                    self.role = role;
                    events.push(AppEvent::RoleChanged(role));
                }
                self.active_screen = role.landing_screen();
                events.push(AppEvent::ScreenChanged(self.active_screen));
                events.push(self.set_status(&message));
                events
            }
            AppCommand::SignOut => {
                self.user = None;
                vec![AppEvent::SessionChanged(None), self.set_status("signed out")]
            }
            AppCommand::SetStatus(message) => vec![self.set_status(&message)],
            AppCommand::ClearStatus => {
                self.status_line = None;
                vec![AppEvent::StatusCleared]
            }
        }
    }

    fn rotate_screen(&mut self, delta: isize) -> Vec<AppEvent> {
        let screens = self.screens();
        let current = screens
            .iter()
            .position(|screen| *screen == self.active_screen)
            .unwrap_or(0) as isize;
        let len = screens.len() as isize;
        let next = (current + delta).rem_euclid(len) as usize;
        self.active_screen = screens[next];
        vec![AppEvent::ScreenChanged(self.active_screen)]
    }

    fn set_status(&mut self, message: &str) -> AppEvent {
        self.status_line = Some(message.to_owned());
        AppEvent::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{AppCommand, AppEvent, AppState};
    use crate::{AppMode, FormKind, Role, ScreenKind, SessionUser};

    fn service_user() -> SessionUser {
        SessionUser {
            user_id: 7,
            email: "tech@example.com".to_owned(),
            name: "Alex Brown".to_owned(),
            role: Role::Service,
        }
    }

    #[test]
    fn screen_rotation_wraps_within_role() {
        let mut state = AppState {
            active_screen: ScreenKind::Notifications,
            ..AppState::for_role(Role::Personal)
        };

        let events = state.dispatch(AppCommand::NextScreen);
        assert_eq!(state.active_screen, ScreenKind::Trips);
        assert_eq!(events, vec![AppEvent::ScreenChanged(ScreenKind::Trips)]);

        state.dispatch(AppCommand::PrevScreen);
        assert_eq!(state.active_screen, ScreenKind::Notifications);
    }

    #[test]
    fn rotation_never_leaves_role_screens() {
        for role in Role::ALL {
            let mut state = AppState::for_role(role);
            for _ in 0..10 {
                state.dispatch(AppCommand::NextScreen);
                assert!(state.active_screen.visible_to(role), "{role:?}");
            }
        }
    }

    #[test]
    fn open_screen_rejects_hidden_screens() {
        let mut state = AppState::for_role(Role::Personal);
        let events = state.dispatch(AppCommand::OpenScreen(ScreenKind::Billing));
        assert_eq!(state.active_screen, ScreenKind::Trips);
        assert_eq!(
            events,
            vec![AppEvent::StatusUpdated(
                "billing is not available to personal".to_owned()
            )]
        );

        let events = state.dispatch(AppCommand::OpenScreen(ScreenKind::Help));
        assert_eq!(state.active_screen, ScreenKind::Help);
        assert_eq!(events, vec![AppEvent::ScreenChanged(ScreenKind::Help)]);
    }

    #[test]
    fn mode_transitions() {
        let mut state = AppState::default();

        state.dispatch(AppCommand::EnterFilter);
        assert_eq!(state.mode, AppMode::Filter);

        state.dispatch(AppCommand::OpenForm(FormKind::Trip));
        assert_eq!(state.mode, AppMode::Form(FormKind::Trip));

        let events = state.dispatch(AppCommand::FormSubmitted(FormKind::Trip));
        assert_eq!(state.mode, AppMode::Nav);
        assert!(events.contains(&AppEvent::FormSubmitted(FormKind::Trip)));
        assert_eq!(state.status_line.as_deref(), Some("trip saved"));
    }

    #[test]
    fn sign_in_switches_role_and_lands() {
        let mut state = AppState::for_role(Role::Personal);
        let events = state.dispatch(AppCommand::SignIn(service_user()));

        assert_eq!(state.role, Role::Service);
        assert_eq!(state.active_screen, ScreenKind::Jobs);
        assert_eq!(
            events,
            vec![
                AppEvent::SessionChanged(Some("tech@example.com".to_owned())),
                AppEvent::RoleChanged(Role::Service),
                AppEvent::ScreenChanged(ScreenKind::Jobs),
                AppEvent::StatusUpdated("signed in as tech@example.com".to_owned()),
            ]
        );

        state.dispatch(AppCommand::SignOut);
        assert_eq!(state.user, None);
        assert_eq!(state.role, Role::Service);
    }

    #[test]
    fn status_set_and_clear() {
        let mut state = AppState::default();
        state.dispatch(AppCommand::SetStatus("reloaded".to_owned()));
        assert_eq!(state.status_line.as_deref(), Some("reloaded"));
        assert_eq!(
            state.dispatch(AppCommand::ClearStatus),
            vec![AppEvent::StatusCleared]
        );
        assert_eq!(state.status_line, None);
    }
}
