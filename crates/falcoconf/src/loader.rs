//! Config file discovery, loading, and environment variable overlay.

use crate::{AudioBackend, ConfigError, FalcoConfig};
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

const SYSTEM_CONFIG: &str = "/etc/falco/config.toml";
const LOCAL_CONFIG: &str = "falco.toml";

/// Existing config files in load order: system, user, local. An existing
/// `cli_path` takes the place of `./falco.toml`.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let user = directories::BaseDirs::new().map(|d| d.config_dir().join("falco").join("config.toml"));
    let local = match cli_path {
        Some(path) if path.exists() => path.to_path_buf(),
        _ => PathBuf::from(LOCAL_CONFIG),
    };

    [Some(PathBuf::from(SYSTEM_CONFIG)), user, Some(local)]
        .into_iter()
        .flatten()
        .filter(|p| p.exists())
        .collect()
}

/// Read a TOML file and overlay it onto `config`.
pub fn load_from_file(config: &mut FalcoConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Overlay the keys present in `contents` onto `config`.
///
/// Keys that are absent keep whatever an earlier layer set.
pub fn apply_toml(config: &mut FalcoConfig, contents: &str, path: &Path) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let section = Section { table: &table, path };

    if let Some(sounds) = section.child("sounds")? {
        if let Some(v) = sounds.str("dir")? {
            config.infra.sounds.dir = expand_path(v);
        }
        if let Some(v) = sounds.str("deterrent")? {
            config.infra.sounds.deterrent = v.to_string();
        }
        if let Some(v) = sounds.str("heartbeat")? {
            config.infra.sounds.heartbeat = v.to_string();
        }
    }

    if let Some(sensor) = section.child("sensor")? {
        if let Some(v) = sensor.int("gpio_pin")? {
            config.infra.sensor.gpio_pin = sensor.narrow("gpio_pin", v)?;
        }
    }

    if let Some(control) = section.child("control")? {
        if let Some(v) = control.str("http_addr")? {
            config.infra.control.http_addr = v.to_string();
        }
    }

    if let Some(audio) = section.child("audio")? {
        if let Some(v) = audio.str("backend")? {
            config.infra.audio.backend = AudioBackend::parse(v).ok_or_else(|| ConfigError::Parse {
                path: path.to_path_buf(),
                message: format!("unknown audio backend '{}'", v),
            })?;
        }
        if let Some(v) = audio.int("sample_rate")? {
            config.infra.audio.sample_rate = audio.narrow("sample_rate", v)?;
        }
        if let Some(v) = audio.int("latency_frames")? {
            config.infra.audio.latency_frames = audio.narrow("latency_frames", v)?;
        }
    }

    if let Some(telemetry) = section.child("telemetry")? {
        if let Some(v) = telemetry.str("log_level")? {
            config.infra.telemetry.log_level = v.to_string();
        }
    }

    if let Some(policy) = section.child("policy")? {
        if let Some(v) = policy.int("cooldown_secs")? {
            config.behavior.policy.cooldown_secs = policy.narrow("cooldown_secs", v)?;
        }
        if let Some(v) = policy.int("daylight_start_hour")? {
            config.behavior.policy.daylight_start_hour = policy.narrow("daylight_start_hour", v)?;
        }
        if let Some(v) = policy.int("daylight_end_hour")? {
            config.behavior.policy.daylight_end_hour = policy.narrow("daylight_end_hour", v)?;
        }
    }

    if let Some(heartbeat) = section.child("heartbeat")? {
        if let Some(v) = heartbeat.bool("enabled")? {
            config.behavior.heartbeat.enabled = v;
        }
        if let Some(v) = heartbeat.int("period_ms")? {
            config.behavior.heartbeat.period_ms = heartbeat.narrow("period_ms", v)?;
        }
    }

    Ok(())
}

/// A TOML table plus the file it came from, for error reporting.
struct Section<'a> {
    table: &'a toml::Table,
    path: &'a Path,
}

impl<'a> Section<'a> {
    fn type_error(&self, key: &str, expected: &str) -> ConfigError {
        ConfigError::Parse {
            path: self.path.to_path_buf(),
            message: format!("'{}' must be {}", key, expected),
        }
    }

    fn child(&self, key: &str) -> Result<Option<Section<'a>>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_table()
                .map(|table| Some(Section { table, path: self.path }))
                .ok_or_else(|| self.type_error(key, "a table")),
        }
    }

    fn str(&self, key: &str) -> Result<Option<&'a str>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v.as_str().map(Some).ok_or_else(|| self.type_error(key, "a string")),
        }
    }

    fn int(&self, key: &str) -> Result<Option<i64>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v.as_integer().map(Some).ok_or_else(|| self.type_error(key, "an integer")),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ConfigError> {
        match self.table.get(key) {
            None => Ok(None),
            Some(v) => v.as_bool().map(Some).ok_or_else(|| self.type_error(key, "a boolean")),
        }
    }

    fn narrow<T: TryFrom<i64>>(&self, key: &str, v: i64) -> Result<T, ConfigError> {
        T::try_from(v).map_err(|_| self.type_error(key, "a non-negative integer in range"))
    }
}

/// Apply environment variable overrides from the process environment.
pub fn apply_env_overrides(config: &mut FalcoConfig, sources: &mut ConfigSources) {
    apply_env_overrides_from(config, sources, env::vars());
}

/// Apply `FALCO_*` (and `RUST_LOG`) overrides from an explicit variable set.
///
/// Values that fail to parse are skipped and not recorded as overrides.
pub fn apply_env_overrides_from<I>(config: &mut FalcoConfig, sources: &mut ConfigSources, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        let applied = match key.as_str() {
            "FALCO_SOUND_DIR" => {
                config.infra.sounds.dir = expand_path(&value);
                true
            }
            "FALCO_DETERRENT_SOUND" => {
                config.infra.sounds.deterrent = value;
                true
            }
            "FALCO_HEARTBEAT_SOUND" => {
                config.infra.sounds.heartbeat = value;
                true
            }
            "FALCO_GPIO_PIN" => parse_into(&value, &mut config.infra.sensor.gpio_pin),
            "FALCO_HTTP_ADDR" => {
                config.infra.control.http_addr = value;
                true
            }
            "FALCO_AUDIO_BACKEND" => match AudioBackend::parse(&value) {
                Some(backend) => {
                    config.infra.audio.backend = backend;
                    true
                }
                None => false,
            },
            "FALCO_COOLDOWN_SECS" => parse_into(&value, &mut config.behavior.policy.cooldown_secs),
            "FALCO_HEARTBEAT_PERIOD_MS" => {
                parse_into(&value, &mut config.behavior.heartbeat.period_ms)
            }
            "FALCO_HEARTBEAT_ENABLED" => parse_into(&value, &mut config.behavior.heartbeat.enabled),
            // RUST_LOG wins over FALCO_LOG_LEVEL regardless of iteration order
            "FALCO_LOG_LEVEL" if !sources.env_overrides.iter().any(|k| k == "RUST_LOG") => {
                config.infra.telemetry.log_level = value;
                true
            }
            "RUST_LOG" => {
                config.infra.telemetry.log_level = value;
                true
            }
            _ => false,
        };

        if applied {
            sources.env_overrides.push(key);
        }
    }
}

fn parse_into<T: std::str::FromStr>(value: &str, slot: &mut T) -> bool {
    match value.trim().parse() {
        Ok(v) => {
            *slot = v;
            true
        }
        Err(_) => false,
    }
}

/// Expand a leading `~/` or `$VAR` in `path`. Unresolvable prefixes are kept.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        return match directories::BaseDirs::new() {
            Some(dirs) => dirs.home_dir().join(rest),
            None => PathBuf::from(path),
        };
    }
    if let Some(rest) = path.strip_prefix('$') {
        let (var, tail) = rest.split_once('/').unwrap_or((rest, ""));
        if let Ok(value) = env::var(var) {
            let base = PathBuf::from(value);
            return if tail.is_empty() { base } else { base.join(tail) };
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn home_prefix_is_expanded() {
        let sounds = expand_path("~/falco/sounds");
        assert!(!sounds.starts_with("~"));
        assert!(sounds.ends_with("falco/sounds"));
    }

    #[test]
    fn plain_and_unknown_var_paths_are_kept() {
        assert_eq!(expand_path("/usr/share/falco"), PathBuf::from("/usr/share/falco"));
        assert_eq!(
            expand_path("$FALCO_SURELY_UNSET_VAR/x"),
            PathBuf::from("$FALCO_SURELY_UNSET_VAR/x")
        );
    }

    #[test]
    fn cli_override_replaces_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "").unwrap();

        let files = discover_config_files_with_override(Some(&path));
        assert_eq!(files.last(), Some(&path));
        assert!(!files.contains(&PathBuf::from(LOCAL_CONFIG)));
    }

    #[test]
    fn test_apply_minimal_toml() {
        let mut config = FalcoConfig::default();
        let toml = r#"
[sounds]
dir = "/srv/sounds"
"#;
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();
        assert_eq!(config.infra.sounds.dir, PathBuf::from("/srv/sounds"));
        assert_eq!(config.infra.sounds.deterrent, "red-tailed-hawk-sound.wav");
        assert_eq!(config.behavior.policy.cooldown_secs, 600);
    }

    #[test]
    fn test_apply_full_toml() {
        let mut config = FalcoConfig::default();
        let toml = r#"
[sounds]
dir = "/data/sounds"
deterrent = "owl.wav"
heartbeat = "tick.wav"

[policy]
cooldown_secs = 120
daylight_start_hour = 6
daylight_end_hour = 21

[heartbeat]
enabled = false
period_ms = 1000

[sensor]
gpio_pin = 17

[control]
http_addr = "0.0.0.0:9000"

[audio]
backend = "pipewire"
sample_rate = 44100
latency_frames = 512

[telemetry]
log_level = "debug"
"#;
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.infra.sounds.dir, PathBuf::from("/data/sounds"));
        assert_eq!(config.infra.sounds.deterrent, "owl.wav");
        assert_eq!(config.infra.sounds.heartbeat, "tick.wav");
        assert_eq!(config.behavior.policy.cooldown_secs, 120);
        assert_eq!(config.behavior.policy.daylight_start_hour, 6);
        assert_eq!(config.behavior.policy.daylight_end_hour, 21);
        assert!(!config.behavior.heartbeat.enabled);
        assert_eq!(config.behavior.heartbeat.period_ms, 1000);
        assert_eq!(config.infra.sensor.gpio_pin, 17);
        assert_eq!(config.infra.control.http_addr, "0.0.0.0:9000");
        assert_eq!(config.infra.audio.backend, AudioBackend::PipeWire);
        assert_eq!(config.infra.audio.sample_rate, 44100);
        assert_eq!(config.infra.audio.latency_frames, 512);
        assert_eq!(config.infra.telemetry.log_level, "debug");
    }

    #[test]
    fn test_later_layer_only_overrides_its_keys() {
        let mut config = FalcoConfig::default();
        apply_toml(&mut config, "[policy]\ncooldown_secs = 30\n", Path::new("a.toml")).unwrap();
        apply_toml(&mut config, "[policy]\ndaylight_end_hour = 19\n", Path::new("b.toml")).unwrap();

        assert_eq!(config.behavior.policy.cooldown_secs, 30);
        assert_eq!(config.behavior.policy.daylight_end_hour, 19);
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let mut config = FalcoConfig::default();
        let err = apply_toml(&mut config, "[sensor]\ngpio_pin = \"four\"\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("gpio_pin"));
    }

    #[test]
    fn test_out_of_range_pin_is_parse_error() {
        let mut config = FalcoConfig::default();
        let err = apply_toml(&mut config, "[sensor]\ngpio_pin = 300\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_unknown_backend_is_parse_error() {
        let mut config = FalcoConfig::default();
        let err = apply_toml(&mut config, "[audio]\nbackend = \"alsa\"\n", Path::new("bad.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("alsa"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = FalcoConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_from(
            &mut config,
            &mut sources,
            vars(&[
                ("FALCO_SOUND_DIR", "/opt/sounds"),
                ("FALCO_COOLDOWN_SECS", "60"),
                ("FALCO_HEARTBEAT_PERIOD_MS", "25"),
                ("FALCO_AUDIO_BACKEND", "pipewire"),
                ("FALCO_GPIO_PIN", "not-a-pin"),
                ("HOME", "/root"),
            ]),
        );

        assert_eq!(config.infra.sounds.dir, PathBuf::from("/opt/sounds"));
        assert_eq!(config.behavior.policy.cooldown_secs, 60);
        assert_eq!(config.behavior.heartbeat.period_ms, 25);
        assert_eq!(config.infra.audio.backend, AudioBackend::PipeWire);
        assert_eq!(config.infra.sensor.gpio_pin, 23);
        assert_eq!(
            sources.env_overrides,
            vec![
                "FALCO_SOUND_DIR",
                "FALCO_COOLDOWN_SECS",
                "FALCO_HEARTBEAT_PERIOD_MS",
                "FALCO_AUDIO_BACKEND"
            ]
        );
    }

    #[test]
    fn test_rust_log_wins_over_falco_log_level() {
        let mut config = FalcoConfig::default();
        let mut sources = ConfigSources::default();
        apply_env_overrides_from(
            &mut config,
            &mut sources,
            vars(&[("RUST_LOG", "falco=trace"), ("FALCO_LOG_LEVEL", "warn")]),
        );
        assert_eq!(config.infra.telemetry.log_level, "falco=trace");
    }
}
