use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use std::time::SystemTime;

const NAME_FORMAT: &str = "%m-%d-%Y_%H-%M-%S";

/// Derives export names from close times.
///
/// Names have one-second resolution, so a second event closing within the
/// same second as the previous one gets a numeric suffix.
#[derive(Debug)]
pub struct EventNamer {
    timezone: Tz,
    last_base: Option<String>,
    repeats: u32,
}

impl EventNamer {
    pub fn new(timezone: Tz) -> Self {
        Self {
            timezone,
            last_base: None,
            repeats: 0,
        }
    }

    pub fn name(&mut self, closed_at: SystemTime, label: Option<&str>) -> String {
        let stamp = DateTime::<Utc>::from(closed_at)
            .with_timezone(&self.timezone)
            .format(NAME_FORMAT)
            .to_string();
        let base = match label {
            Some(label) => format!("{}_{}", stamp, label),
            None => stamp,
        };

        if self.last_base.as_deref() == Some(base.as_str()) {
            self.repeats += 1;
            format!("{}_{}", base, self.repeats + 1)
        } else {
            self.repeats = 0;
            self.last_base = Some(base.clone());
            base
        }
    }
}
