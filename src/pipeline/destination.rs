//! Destination identities.
//!
//! Destinations are a closed set resolved when the configuration is loaded,
//! so there is no string lookup at deploy time.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::artifact::Platform;
use crate::config::DestinationsConfig;

/// A supported distribution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationKind {
    /// Internal testing distribution
    Firebase,
    /// Store publishing with an edit transaction
    Play,
    /// iOS store-grade upload of a pre-built archive
    TestFlight,
    /// Copy into a local directory
    Local,
}

/// How strict a destination is about what it accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    /// Requires a signed app bundle
    Store,
    /// Accepts either kind, unsigned allowed
    Lab,
    /// Accepts either kind, unsigned allowed
    LocalCopy,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Grade::Store => "store",
            Grade::Lab => "lab",
            Grade::LocalCopy => "local copy",
        })
    }
}

impl DestinationKind {
    /// Every destination in a stable order.
    pub const ALL: [DestinationKind; 4] = [
        DestinationKind::Firebase,
        DestinationKind::Play,
        DestinationKind::TestFlight,
        DestinationKind::Local,
    ];

    /// Name used in reports and messages.
    pub fn name(&self) -> &'static str {
        match self {
            DestinationKind::Firebase => "firebase",
            DestinationKind::Play => "play",
            DestinationKind::TestFlight => "testflight",
            DestinationKind::Local => "local",
        }
    }

    /// Acceptance grade.
    pub fn grade(&self) -> Grade {
        match self {
            DestinationKind::Play | DestinationKind::TestFlight => Grade::Store,
            DestinationKind::Firebase => Grade::Lab,
            DestinationKind::Local => Grade::LocalCopy,
        }
    }

    /// Platform whose artifacts this destination receives.
    pub fn platform(&self) -> Platform {
        match self {
            DestinationKind::TestFlight => Platform::Ios,
            _ => Platform::Android,
        }
    }

    /// Whether the pipeline builds this destination's artifact.
    ///
    /// iOS archives are supplied pre-built and bypass build, signing and
    /// validation.
    pub fn uses_built_artifact(&self) -> bool {
        self.platform() == Platform::Android
    }
}

impl fmt::Display for DestinationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Destinations switched on in `config`, in stable order.
pub fn enabled_destinations(config: &DestinationsConfig) -> Vec<DestinationKind> {
    DestinationKind::ALL
        .into_iter()
        .filter(|d| match d {
            DestinationKind::Firebase => config.firebase.as_ref().is_some_and(|c| c.enabled),
            DestinationKind::Play => config.play.as_ref().is_some_and(|c| c.enabled),
            DestinationKind::TestFlight => config.testflight.as_ref().is_some_and(|c| c.enabled),
            DestinationKind::Local => config.local.as_ref().is_some_and(|c| c.enabled),
        })
        .collect()
}
