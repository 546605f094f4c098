use std::path::PathBuf;
use std::time::Duration;

use foundation::geometry::SQ_M_PER_SQ_KM;
use jobs::client::JobSettings;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
pub const DEFAULT_COMMUNITIES_URL: &str = "pmtiles://communities";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    /// Vector tiles holding the community polygons.
    pub communities_url: String,
    pub poll_interval: Duration,
    pub max_wait: Duration,
    pub max_area_km2: f64,
    pub max_poll_failures: u32,
    pub cache_capacity: usize,
    pub draft_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        let jobs = JobSettings::default();
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            communities_url: DEFAULT_COMMUNITIES_URL.to_string(),
            poll_interval: jobs.poll_interval,
            max_wait: jobs.max_wait,
            max_area_km2: 10_000.0,
            max_poll_failures: jobs.max_poll_failures,
            cache_capacity: jobs.cache_capacity,
            draft_path: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads every `ANALYSIS_*` variable through `lookup`. Missing or
    /// unparsable values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());
        Self {
            api_url: lookup("ANALYSIS_API_URL").unwrap_or(d.api_url),
            communities_url: lookup("ANALYSIS_COMMUNITIES_URL").unwrap_or(d.communities_url),
            poll_interval: parsed("ANALYSIS_POLL_INTERVAL_MS")
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(d.poll_interval),
            max_wait: parsed("ANALYSIS_MAX_WAIT_S")
                .map(Duration::from_secs)
                .unwrap_or(d.max_wait),
            max_area_km2: lookup("ANALYSIS_MAX_AREA_KM2")
                .and_then(|v| v.trim().parse::<f64>().ok())
                .filter(|km2| km2.is_finite() && *km2 > 0.0)
                .unwrap_or(d.max_area_km2),
            max_poll_failures: parsed("ANALYSIS_MAX_POLL_FAILURES")
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(d.max_poll_failures),
            cache_capacity: parsed("ANALYSIS_CACHE_CAPACITY")
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(d.cache_capacity),
            draft_path: lookup("ANALYSIS_DRAFT_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn max_area_m2(&self) -> f64 {
        self.max_area_km2 * SQ_M_PER_SQ_KM
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            poll_interval: self.poll_interval,
            max_wait: self.max_wait,
            max_poll_failures: self.max_poll_failures,
            cache_capacity: self.cache_capacity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let s = Settings::from_lookup(|_| None);
        assert_eq!(s, Settings::default());
        assert_eq!(s.poll_interval, Duration::from_secs(3));
        assert_eq!(s.max_wait, Duration::from_secs(600));
        assert_eq!(s.max_area_m2(), 10_000.0 * 1_000_000.0);
        assert_eq!(s.job_settings().max_poll_failures, 3);
        assert_eq!(s.job_settings().cache_capacity, 16);
    }

    #[test]
    fn environment_overrides() {
        let s = Settings::from_lookup(lookup(&[
            ("ANALYSIS_API_URL", "https://analysis.example.org"),
            ("ANALYSIS_POLL_INTERVAL_MS", "500"),
            ("ANALYSIS_MAX_WAIT_S", "30"),
            ("ANALYSIS_MAX_AREA_KM2", "250.5"),
            ("ANALYSIS_MAX_POLL_FAILURES", "5"),
            ("ANALYSIS_CACHE_CAPACITY", "0"),
            ("ANALYSIS_DRAFT_PATH", "/tmp/draft.json"),
        ]));
        assert_eq!(s.api_url, "https://analysis.example.org");
        assert_eq!(s.poll_interval, Duration::from_millis(500));
        assert_eq!(s.max_wait, Duration::from_secs(30));
        assert_eq!(s.max_area_km2, 250.5);
        assert_eq!(s.max_poll_failures, 5);
        assert_eq!(s.cache_capacity, 0);
        assert_eq!(s.draft_path, Some(PathBuf::from("/tmp/draft.json")));
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let s = Settings::from_lookup(lookup(&[
            ("ANALYSIS_POLL_INTERVAL_MS", "soon"),
            ("ANALYSIS_MAX_AREA_KM2", "-4"),
            ("ANALYSIS_MAX_POLL_FAILURES", "0"),
            ("ANALYSIS_DRAFT_PATH", "  "),
        ]));
        let d = Settings::default();
        assert_eq!(s.poll_interval, d.poll_interval);
        assert_eq!(s.max_area_km2, d.max_area_km2);
        assert_eq!(s.max_poll_failures, d.max_poll_failures);
        assert_eq!(s.draft_path, None);
    }
}
