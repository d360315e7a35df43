use std::sync::{Arc, Mutex};

use crate::state::lock;
use crate::traits::{ChangeReceiver, ChangeSignal, Observable};

/// Region settings used to normalize numbers
pub trait RegionSettings: Observable + Send + Sync {
    /// Whether the settings are loaded
    fn ready(&self) -> bool;

    /// ISO 3166 alpha-2 country code
    fn country_code(&self) -> String;

    /// Default area code, empty when unset
    fn area_code(&self) -> String;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Region {
    ready: bool,
    country_code: String,
    area_code: String,
}

/// In-process region settings
#[derive(Debug, Clone, Default)]
pub struct LocalRegion {
    region: Arc<Mutex<Region>>,
    signal: Arc<ChangeSignal>,
}

impl LocalRegion {
    /// Ready settings for a country and area code
    pub fn new(country_code: impl Into<String>, area_code: impl Into<String>) -> Self {
        Self {
            region: Arc::new(Mutex::new(Region {
                ready: true,
                country_code: country_code.into(),
                area_code: area_code.into(),
            })),
            signal: Arc::new(ChangeSignal::new()),
        }
    }

    /// Change the region
    pub fn set(&self, country_code: impl Into<String>, area_code: impl Into<String>) {
        {
            let mut region = lock(&self.region);
            region.country_code = country_code.into();
            region.area_code = area_code.into();
        }
        self.signal.notify();
    }

    /// Mark the settings loaded or not
    pub fn set_ready(&self, ready: bool) {
        let changed = {
            let mut region = lock(&self.region);
            std::mem::replace(&mut region.ready, ready) != ready
        };
        if changed {
            self.signal.notify();
        }
    }
}

impl Observable for LocalRegion {
    fn changes(&self) -> ChangeReceiver {
        self.signal.subscribe()
    }
}

impl RegionSettings for LocalRegion {
    fn ready(&self) -> bool {
        lock(&self.region).ready
    }

    fn country_code(&self) -> String {
        lock(&self.region).country_code.clone()
    }

    fn area_code(&self) -> String {
        lock(&self.region).area_code.clone()
    }
}
