use crate::session::SessionStore;

/// Views the console can present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Auth,
    Proxies,
    History,
}

/// Session gate, keyed solely on credential presence. No server round-trip:
/// a token the server has stopped accepting still counts as authenticated
/// here and only surfaces as request errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    Authenticated,
}

impl GateState {
    /// Derive the gate synchronously from the session store.
    pub fn of(session: &SessionStore) -> Self {
        if session.get().is_some() {
            Self::Authenticated
        } else {
            Self::Unauthenticated
        }
    }
}

/// Resolve which view may actually run.
///
/// Without a credential every request lands on the auth view, so protected
/// views never run unauthenticated. With one, the auth view redirects to the
/// proxies view instead of showing the form again.
pub fn route(requested: View, gate: GateState) -> View {
    match (gate, requested) {
        (GateState::Unauthenticated, _) => View::Auth,
        (GateState::Authenticated, View::Auth) => View::Proxies,
        (GateState::Authenticated, view) => view,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use url::Url;

    fn session(dir: &TempDir) -> SessionStore {
        SessionStore::at(dir.path(), &Url::parse("http://localhost:8080").unwrap())
    }

    #[test]
    fn test_every_view_routes_to_auth_without_credential() {
        let dir = TempDir::new().unwrap();
        let gate = GateState::of(&session(&dir));
        assert_eq!(gate, GateState::Unauthenticated);

        for requested in [View::Auth, View::Proxies, View::History] {
            assert_eq!(route(requested, gate), View::Auth);
        }
    }

    #[test]
    fn test_protected_views_pass_with_credential() {
        let dir = TempDir::new().unwrap();
        let store = session(&dir);
        store.set("T").unwrap();
        let gate = GateState::of(&store);
        assert_eq!(gate, GateState::Authenticated);

        assert_eq!(route(View::Proxies, gate), View::Proxies);
        assert_eq!(route(View::History, gate), View::History);
    }

    #[test]
    fn test_auth_view_redirects_away_when_authenticated() {
        let dir = TempDir::new().unwrap();
        let store = session(&dir);
        store.set("T").unwrap();

        assert_eq!(route(View::Auth, GateState::of(&store)), View::Proxies);
    }

    #[test]
    fn test_toggling_credential_flips_routing() {
        let dir = TempDir::new().unwrap();
        let store = session(&dir);

        assert_eq!(route(View::Proxies, GateState::of(&store)), View::Auth);

        store.set("T").unwrap();
        assert_eq!(route(View::Proxies, GateState::of(&store)), View::Proxies);

        store.clear().unwrap();
        assert_eq!(route(View::Proxies, GateState::of(&store)), View::Auth);
    }
}
