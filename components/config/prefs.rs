/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use log::debug;
use parking_lot::{RwLock, RwLockReadGuard};
use serde::{Deserialize, Serialize};

static PREFERENCES: LazyLock<RwLock<Preferences>> =
    LazyLock::new(|| RwLock::new(Preferences::default()));

/// Read a single preference by field name, e.g. `pref!(user_agent)`.
#[macro_export]
macro_rules! pref {
    ($name: ident) => {
        $crate::prefs::get().$name.clone()
    };
}

#[inline]
pub fn get() -> RwLockReadGuard<'static, Preferences> {
    PREFERENCES.read()
}

pub fn set(preferences: Preferences) {
    *PREFERENCES.write() = preferences;
}

/// Replace the process-wide preferences with the contents of a JSON file. Fields
/// missing from the file keep their default values.
pub fn read_prefs_file(path: &Path) -> Result<Preferences, PrefError> {
    let contents = fs::read_to_string(path).map_err(PrefError::Io)?;
    let preferences = Preferences::from_json(&contents)?;
    debug!("Loaded preferences from {}", path.display());
    set(preferences.clone());
    Ok(preferences)
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct Preferences {
    /// How long, in milliseconds, a suspended request may hold back requests for
    /// the same URL before it is forced to resume.
    pub network_cache_suspended_writer_delay_ms: i64,
    /// When false, requests for a URL whose first request is suspended are sent
    /// independently instead of waiting for it.
    pub network_http_coalesce_suspended_requests: bool,
    pub user_agent: String,
}

impl Preferences {
    pub fn from_json(json: &str) -> Result<Preferences, PrefError> {
        serde_json::from_str(json).map_err(PrefError::Parse)
    }
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            network_cache_suspended_writer_delay_ms: 5000,
            network_http_coalesce_suspended_requests: true,
            user_agent: format!("Mozilla/5.0 {}", crate::coalesce_version()),
        }
    }
}

#[derive(Debug)]
pub enum PrefError {
    Io(std::io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for PrefError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PrefError::Io(error) => write!(f, "Failed to read preferences: {}", error),
            PrefError::Parse(error) => write!(f, "Failed to parse preferences: {}", error),
        }
    }
}

impl std::error::Error for PrefError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PrefError::Io(error) => Some(error),
            PrefError::Parse(error) => Some(error),
        }
    }
}
