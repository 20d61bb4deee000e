//! Process-wide singleton registry, keyed by credential (spec §4.4.1).
//!
//! A `HashMap<String, Handle>` behind a `Mutex`: the first lookup for a
//! credential constructs the client; every later lookup for the same
//! credential returns that same instance, regardless of the options passed
//! (the first caller's options win — spec §4.4.1's deliberate contract).

use crate::client::{ClientOptions, RandomOrgClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

fn registry() -> &'static Mutex<HashMap<String, Arc<RandomOrgClient>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<RandomOrgClient>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get the singleton client for `credential`, constructing it with
/// `options` on first lookup only.
pub fn get_or_create(credential: &str, options: ClientOptions) -> Arc<RandomOrgClient> {
    let mut map = registry().lock().unwrap();
    if let Some(existing) = map.get(credential) {
        return Arc::clone(existing);
    }
    let client = RandomOrgClient::new(credential.to_string(), options);
    map.insert(credential.to_string(), Arc::clone(&client));
    client
}

#[cfg(test)]
pub(crate) fn clear_for_test() {
    registry().lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invariant1_singleton_uniqueness() {
        clear_for_test();
        let a = get_or_create("key-a", ClientOptions::default());
        let a2 = get_or_create("key-a", ClientOptions::default());
        assert!(Arc::ptr_eq(&a, &a2));

        let b = get_or_create("key-b", ClientOptions::default());
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn first_callers_options_win() {
        clear_for_test();
        let mut tight = ClientOptions::default();
        tight.serialized = false;
        let first = get_or_create("key-opts", tight);
        assert!(!first.is_serialized());

        let mut loose = ClientOptions::default();
        loose.serialized = true;
        let second = get_or_create("key-opts", loose);
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!second.is_serialized());
    }
}
