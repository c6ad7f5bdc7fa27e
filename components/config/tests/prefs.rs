/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fs;

use coalesce_config::pref;
use coalesce_config::prefs::{self, PrefError, Preferences};

#[test]
fn test_default_preferences() {
    let preferences = Preferences::default();
    assert_eq!(preferences.network_cache_suspended_writer_delay_ms, 5000);
    assert!(preferences.network_http_coalesce_suspended_requests);
    assert!(preferences.user_agent.starts_with("Mozilla/5.0"));
}

#[test]
fn test_partial_json_keeps_defaults() {
    let preferences =
        Preferences::from_json(r#"{ "network_cache_suspended_writer_delay_ms": 300 }"#).unwrap();
    assert_eq!(preferences.network_cache_suspended_writer_delay_ms, 300);
    assert!(preferences.network_http_coalesce_suspended_requests);
    assert_eq!(preferences.user_agent, Preferences::default().user_agent);
}

#[test]
fn test_malformed_json_is_a_parse_error() {
    let result = Preferences::from_json("{ network_cache_suspended_writer_delay_ms: ");
    assert!(matches!(result, Err(PrefError::Parse(_))));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let path = std::env::temp_dir().join("coalesce-prefs-that-does-not-exist.json");
    let result = prefs::read_prefs_file(&path);
    assert!(matches!(result, Err(PrefError::Io(_))));
}

#[test]
fn test_read_prefs_file_updates_global_preferences() {
    let path = std::env::temp_dir().join(format!("coalesce-prefs-{}.json", std::process::id()));
    fs::write(
        &path,
        r#"{ "network_cache_suspended_writer_delay_ms": 1000, "user_agent": "test-agent" }"#,
    )
    .unwrap();

    let preferences = prefs::read_prefs_file(&path).unwrap();
    let _ = fs::remove_file(&path);

    assert_eq!(preferences.network_cache_suspended_writer_delay_ms, 1000);
    assert_eq!(pref!(network_cache_suspended_writer_delay_ms), 1000);
    assert_eq!(pref!(user_agent), "test-agent");
}
