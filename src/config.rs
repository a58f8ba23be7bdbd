use std::collections::{BTreeMap, HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use directories::BaseDirs;
use reqwest::Url;
use secrecy::SecretBox;
use serde::de::Deserializer;
use serde::Deserialize;

const CONFIG_FILE_NAME: &str = "config.toml";
const LOG_FILE_NAME: &str = "keapdesk.log";
const APP_NAME: &str = "keapdesk";

/// Overrides `api.token` when set.
pub const TOKEN_ENV: &str = "KEAPDESK_API_TOKEN";

pub const DEFAULT_BASE_URL: &str = "https://api.infusionsoft.com/crm/rest";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 2;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug)]
pub struct Config {
    pub config_path: PathBuf,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
    pub keys: Keys,
    pub ui: UiConfig,
}

// =============================================================================
// API and logging
// =============================================================================

#[derive(Debug)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: SecretBox<String>,
    pub timeout: Duration,
    pub max_retries: u32,
    /// Extra headers sent with every request, replacing defaults of the same name.
    pub headers: Vec<(String, String)>,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: SecretBox::new(Box::new(token.into())),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            headers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub file: PathBuf,
    pub level: String,
}

/// Expand ~ to home directory in paths
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(stripped) = path.strip_prefix("~") {
        if let Some(home) = home::home_dir() {
            return home.join(stripped);
        }
    }
    path.to_path_buf()
}

// =============================================================================
// UI
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub colors: UiColors,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UiColors {
    pub border: RgbColor,
    pub selection_bg: RgbColor,
    pub selection_fg: RgbColor,
    pub separator: RgbColor,
    pub status_fg: RgbColor,
    pub status_bg: RgbColor,
    pub error_fg: RgbColor,
}

impl Default for UiColors {
    fn default() -> Self {
        Self {
            border: RgbColor::new(255, 165, 0),
            selection_bg: RgbColor::new(255, 165, 0),
            selection_fg: RgbColor::new(0, 0, 0),
            separator: RgbColor::new(255, 165, 0),
            status_fg: RgbColor::new(255, 165, 0),
            status_bg: RgbColor::new(0, 0, 0),
            error_fg: RgbColor::new(255, 85, 85),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RgbColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl RgbColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl<'de> serde::Deserialize<'de> for RgbColor {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Helper {
            Array([u8; 3]),
            Map { r: u8, g: u8, b: u8 },
        }

        let helper = Helper::deserialize(deserializer)?;
        let (r, g, b) = match helper {
            Helper::Array(values) => (values[0], values[1], values[2]),
            Helper::Map { r, g, b } => (r, g, b),
        };
        Ok(RgbColor { r, g, b })
    }
}

// =============================================================================
// Key bindings
// =============================================================================

/// Support both a single string and an array in the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum KeyBinding {
    Single(String),
    Multiple(Vec<String>),
}

impl KeyBinding {
    fn into_vec(self) -> Vec<String> {
        match self {
            KeyBinding::Single(s) => vec![s],
            KeyBinding::Multiple(v) => v,
        }
    }
}

/// Keys bound to one action.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bindings(pub Vec<String>);

impl Bindings {
    fn of(keys: &[&str]) -> Self {
        Self(keys.iter().map(|k| k.to_string()).collect())
    }

    pub fn keys(&self) -> &[String] {
        &self.0
    }

    /// First binding, for help text.
    pub fn label(&self) -> &str {
        self.0.first().map(String::as_str).unwrap_or("")
    }
}

impl<'de> Deserialize<'de> for Bindings {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        KeyBinding::deserialize(deserializer).map(|binding| Bindings(binding.into_vec()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Keys {
    pub list: ListKeys,
    pub search_input: InputKeys,
    pub form: FormKeys,
    pub detail: DetailKeys,
    pub note_input: NoteInputKeys,
    pub modal: ModalKeys,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListKeys {
    pub add: Bindings,
    pub view: Bindings,
    pub edit: Bindings,
    pub delete: Bindings,
    pub search: Bindings,
    pub clear_search: Bindings,
    pub refresh: Bindings,
    pub next: Bindings,
    pub prev: Bindings,
    pub quit: Bindings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputKeys {
    pub confirm: Bindings,
    pub cancel: Bindings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormKeys {
    pub next_field: Bindings,
    pub prev_field: Bindings,
    pub submit: Bindings,
    pub cancel: Bindings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetailKeys {
    pub edit: Bindings,
    pub back: Bindings,
    pub refresh: Bindings,
    pub note: Bindings,
    pub next: Bindings,
    pub prev: Bindings,
    pub edit_note: Bindings,
    pub delete_note: Bindings,
    pub quit: Bindings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NoteInputKeys {
    pub next_field: Bindings,
    pub submit: Bindings,
    pub cancel: Bindings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModalKeys {
    pub confirm: Bindings,
    pub cancel: Bindings,
}

impl Default for ListKeys {
    fn default() -> Self {
        Self {
            add: Bindings::of(&["a"]),
            view: Bindings::of(&["Enter", "v"]),
            edit: Bindings::of(&["e"]),
            delete: Bindings::of(&["d"]),
            search: Bindings::of(&["/"]),
            clear_search: Bindings::of(&["c"]),
            refresh: Bindings::of(&["r", "F5"]),
            next: Bindings::of(&["j", "Down"]),
            prev: Bindings::of(&["k", "Up"]),
            quit: Bindings::of(&["q"]),
        }
    }
}

impl Default for InputKeys {
    fn default() -> Self {
        Self {
            confirm: Bindings::of(&["Enter"]),
            cancel: Bindings::of(&["Escape"]),
        }
    }
}

impl Default for FormKeys {
    fn default() -> Self {
        Self {
            next_field: Bindings::of(&["Tab", "Down"]),
            prev_field: Bindings::of(&["Backtab", "Up"]),
            submit: Bindings::of(&["Enter"]),
            cancel: Bindings::of(&["Escape"]),
        }
    }
}

impl Default for DetailKeys {
    fn default() -> Self {
        Self {
            edit: Bindings::of(&["e"]),
            back: Bindings::of(&["Escape", "b"]),
            refresh: Bindings::of(&["r", "F5"]),
            note: Bindings::of(&["n"]),
            next: Bindings::of(&["j", "Down"]),
            prev: Bindings::of(&["k", "Up"]),
            edit_note: Bindings::of(&["E"]),
            delete_note: Bindings::of(&["x"]),
            quit: Bindings::of(&["q"]),
        }
    }
}

impl Default for NoteInputKeys {
    fn default() -> Self {
        Self {
            next_field: Bindings::of(&["Tab", "Backtab"]),
            submit: Bindings::of(&["Enter"]),
            cancel: Bindings::of(&["Escape"]),
        }
    }
}

impl Default for ModalKeys {
    fn default() -> Self {
        Self {
            confirm: Bindings::of(&["y", "Enter"]),
            cancel: Bindings::of(&["n", "Escape"]),
        }
    }
}

impl Keys {
    /// `(context, [(action, bindings)])` for every context.
    fn contexts(&self) -> Vec<(&'static str, Vec<(&'static str, &Bindings)>)> {
        vec![
            (
                "list",
                vec![
                    ("add", &self.list.add),
                    ("view", &self.list.view),
                    ("edit", &self.list.edit),
                    ("delete", &self.list.delete),
                    ("search", &self.list.search),
                    ("clear_search", &self.list.clear_search),
                    ("refresh", &self.list.refresh),
                    ("next", &self.list.next),
                    ("prev", &self.list.prev),
                    ("quit", &self.list.quit),
                ],
            ),
            (
                "search_input",
                vec![
                    ("confirm", &self.search_input.confirm),
                    ("cancel", &self.search_input.cancel),
                ],
            ),
            (
                "form",
                vec![
                    ("next_field", &self.form.next_field),
                    ("prev_field", &self.form.prev_field),
                    ("submit", &self.form.submit),
                    ("cancel", &self.form.cancel),
                ],
            ),
            (
                "detail",
                vec![
                    ("edit", &self.detail.edit),
                    ("back", &self.detail.back),
                    ("refresh", &self.detail.refresh),
                    ("note", &self.detail.note),
                    ("next", &self.detail.next),
                    ("prev", &self.detail.prev),
                    ("edit_note", &self.detail.edit_note),
                    ("delete_note", &self.detail.delete_note),
                    ("quit", &self.detail.quit),
                ],
            ),
            (
                "note_input",
                vec![
                    ("next_field", &self.note_input.next_field),
                    ("submit", &self.note_input.submit),
                    ("cancel", &self.note_input.cancel),
                ],
            ),
            (
                "modal",
                vec![
                    ("confirm", &self.modal.confirm),
                    ("cancel", &self.modal.cancel),
                ],
            ),
        ]
    }
}

/// Normalize a key binding string to a canonical form for collision detection.
/// Single characters preserve case (since 'M' means Shift+m, different from 'm').
/// Multi-character key names are case-insensitive (Enter, ENTER, enter are the same).
fn normalize_binding(binding: &str) -> String {
    let trimmed = binding.trim();
    if trimmed.chars().count() == 1 {
        trimmed.to_string()
    } else {
        trimmed.to_ascii_lowercase()
    }
}

/// Check for collisions within a single context
fn check_context_collisions(bindings: &[(&str, &Bindings)], context_name: &str) -> Result<()> {
    let mut seen: HashMap<String, &str> = HashMap::new();

    for (action_name, keys) in bindings {
        for key in keys.keys() {
            let normalized = normalize_binding(key);
            if normalized.is_empty() {
                continue;
            }
            if let Some(existing_action) = seen.get(&normalized) {
                bail!(
                    "key binding collision in [keys.{}]: '{}' is bound to both '{}' and '{}'",
                    context_name,
                    key,
                    existing_action,
                    action_name
                );
            }
            seen.insert(normalized, action_name);
        }
    }

    Ok(())
}

fn validate_key_bindings(keys: &Keys) -> Result<()> {
    for (context, bindings) in keys.contexts() {
        check_context_collisions(&bindings, context)?;
    }
    Ok(())
}

// =============================================================================
// Config file structure
// =============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    api: ApiFile,
    logging: LoggingFile,
    ui: UiConfig,
    keys: Keys,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ApiFile {
    base_url: String,
    token: Option<String>,
    timeout_secs: u64,
    max_retries: u32,
    headers: BTreeMap<String, String>,
}

impl Default for ApiFile {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            headers: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct LoggingFile {
    file: Option<PathBuf>,
    level: Option<String>,
}

impl ApiFile {
    fn into_config(self, config_path: &Path, env_token: Option<String>) -> Result<ApiConfig> {
        let token = env_token
            .filter(|t| !t.trim().is_empty())
            .or(self.token.filter(|t| !t.trim().is_empty()))
            .ok_or_else(|| {
                anyhow!(
                    "no API token: set api.token in {} or the {} environment variable",
                    config_path.display(),
                    TOKEN_ENV
                )
            })?;

        let base_url = self.base_url.trim().to_string();
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("invalid api.base_url `{}`", base_url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!("invalid api.base_url `{}`: expected http or https", base_url);
        }

        if self.timeout_secs == 0 {
            bail!("api.timeout_secs must be greater than zero");
        }

        Ok(ApiConfig {
            base_url,
            token: SecretBox::new(Box::new(token.trim().to_string())),
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            headers: self.headers.into_iter().collect(),
        })
    }
}

impl LoggingFile {
    fn into_config(self) -> Result<LoggingConfig> {
        let file = match self.file {
            Some(path) => expand_tilde(&path),
            None => data_root()?.join(LOG_FILE_NAME),
        };
        let level = self
            .level
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
        Ok(LoggingConfig { file, level })
    }
}

fn base_dirs() -> Result<BaseDirs> {
    BaseDirs::new().context("unable to determine base directories")
}

fn config_root() -> Result<PathBuf> {
    Ok(base_dirs()?.config_dir().join(APP_NAME))
}

fn data_root() -> Result<PathBuf> {
    Ok(base_dirs()?.data_dir().join(APP_NAME))
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_root()?.join(CONFIG_FILE_NAME))
}

pub fn ensure_config_dir() -> Result<()> {
    let dir = config_root()?;
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create config dir: {}", dir.display()))?;
    }
    Ok(())
}

/// Load from `explicit`, or from the per-user config directory.
pub fn load(explicit: Option<&Path>) -> Result<Config> {
    let path = match explicit {
        Some(path) => expand_tilde(path),
        None => {
            ensure_config_dir()?;
            config_path()?
        }
    };
    if !path.exists() {
        bail!(
            "configuration file not found at {}. Please create it as per docs.",
            path.display()
        );
    }

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file at {}", path.display()))?;

    parse(&raw, path, env::var(TOKEN_ENV).ok())
}

fn parse(raw: &str, path: PathBuf, env_token: Option<String>) -> Result<Config> {
    let value: toml::Value = toml::from_str(raw)
        .with_context(|| format!("failed to parse {} as TOML", path.display()))?;

    warn_unknown_keys(&value);

    let cfg_file: ConfigFile = value
        .try_into()
        .with_context(|| format!("failed to deserialize config from {}", path.display()))?;

    validate_key_bindings(&cfg_file.keys)?;

    let api = cfg_file.api.into_config(&path, env_token)?;
    let logging = cfg_file
        .logging
        .into_config()
        .context("failed to resolve logging configuration")?;

    Ok(Config {
        config_path: path,
        api,
        logging,
        keys: cfg_file.keys,
        ui: cfg_file.ui,
    })
}

// =============================================================================
// Unknown key warnings
// =============================================================================

const TOP_LEVEL_KEYS: &[&str] = &["api", "logging", "ui", "keys"];
const API_KEYS: &[&str] = &["base_url", "token", "timeout_secs", "max_retries", "headers"];
const LOGGING_KEYS: &[&str] = &["file", "level"];
const UI_KEYS: &[&str] = &["colors"];
const UI_COLOR_KEYS: &[&str] = &[
    "border",
    "selection_bg",
    "selection_fg",
    "separator",
    "status_fg",
    "status_bg",
    "error_fg",
];

fn warn_unknown_keys(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    warn_unknown_in(value, "configuration key", TOP_LEVEL_KEYS);

    if let Some(api) = table.get("api") {
        warn_unknown_in(api, "api.* entry", API_KEYS);
    }
    if let Some(logging) = table.get("logging") {
        warn_unknown_in(logging, "logging.* entry", LOGGING_KEYS);
    }
    if let Some(ui) = table.get("ui") {
        warn_unknown_in(ui, "ui.* entry", UI_KEYS);
        if let Some(colors) = ui.get("colors") {
            warn_unknown_in(colors, "ui.colors entry", UI_COLOR_KEYS);
        }
    }
    if let Some(keys) = table.get("keys") {
        warn_unknown_keys_section(keys);
    }
}

fn warn_unknown_keys_section(value: &toml::Value) {
    let Some(table) = value.as_table() else {
        return;
    };

    let defaults = Keys::default();
    let contexts = defaults.contexts();
    let known_contexts: HashSet<&str> = contexts.iter().map(|(name, _)| *name).collect();

    for key in table.keys() {
        if !known_contexts.contains(key.as_str()) {
            eprintln!("warning: unknown keys.* context `{}`", key);
        }
    }

    for (context, bindings) in &contexts {
        if let Some(v) = table.get(*context) {
            let known: Vec<&str> = bindings.iter().map(|(action, _)| *action).collect();
            warn_unknown_in(v, &format!("keys.{}.* entry", context), &known);
        }
    }
}

fn warn_unknown_in(value: &toml::Value, label: &str, known: &[&str]) {
    let Some(table) = value.as_table() else {
        return;
    };
    let known_set: HashSet<&str> = known.iter().copied().collect();
    for key in table.keys() {
        if !known_set.contains(key.as_str()) {
            eprintln!("warning: unknown {} `{}`", label, key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn parse_str(raw: &str, env_token: Option<&str>) -> Result<Config> {
        parse(raw, PathBuf::from("/tmp/keapdesk.toml"), env_token.map(str::to_string))
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse_str("[api]\ntoken = \"abc\"\n", None).unwrap();

        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.token.expose_secret(), "abc");
        assert_eq!(config.api.timeout, Duration::from_secs(30));
        assert_eq!(config.api.max_retries, 2);
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.ends_with("keapdesk/keapdesk.log"));
        assert_eq!(config.keys.list.view.keys(), ["Enter", "v"]);
    }

    #[test]
    fn environment_token_wins() {
        let config = parse_str("[api]\ntoken = \"from-file\"\n", Some("from-env")).unwrap();
        assert_eq!(config.api.token.expose_secret(), "from-env");

        let config = parse_str("", Some("only-env")).unwrap();
        assert_eq!(config.api.token.expose_secret(), "only-env");
    }

    #[test]
    fn missing_token_is_an_error() {
        let err = parse_str("[api]\ntoken = \"  \"\n", None).unwrap_err();
        assert!(err.to_string().contains("no API token"));
    }

    #[test]
    fn token_is_redacted_in_debug_output() {
        let config = parse_str("[api]\ntoken = \"super-secret\"\n", None).unwrap();
        assert!(!format!("{:?}", config.api).contains("super-secret"));
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        let err = parse_str("[api]\ntoken = \"t\"\nbase_url = \"not a url\"\n", None).unwrap_err();
        assert!(err.to_string().contains("invalid api.base_url"));

        let err =
            parse_str("[api]\ntoken = \"t\"\nbase_url = \"ftp://example.com\"\n", None).unwrap_err();
        assert!(err.to_string().contains("expected http or https"));
    }

    #[test]
    fn bindings_accept_string_or_array() {
        let raw = r#"
            [api]
            token = "t"

            [keys.list]
            add = "A"
            refresh = ["R", "F5"]
        "#;
        let config = parse_str(raw, None).unwrap();
        assert_eq!(config.keys.list.add.keys(), ["A"]);
        assert_eq!(config.keys.list.refresh.keys(), ["R", "F5"]);
        assert_eq!(config.keys.list.quit.label(), "q");
    }

    #[test]
    fn collisions_within_a_context_fail() {
        let raw = r#"
            [api]
            token = "t"

            [keys.list]
            add = "d"
        "#;
        let err = parse_str(raw, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "key binding collision in [keys.list]: 'd' is bound to both 'add' and 'delete'"
        );
    }

    #[test]
    fn case_matters_only_for_single_characters() {
        assert_eq!(normalize_binding("E"), "E");
        assert_eq!(normalize_binding("ENTER"), "enter");
        assert!(validate_key_bindings(&Keys::default()).is_ok());
    }

    #[test]
    fn colors_accept_array_or_map() {
        let raw = r#"
            [api]
            token = "t"

            [ui.colors]
            border = [1, 2, 3]
            error_fg = { r = 4, g = 5, b = 6 }
        "#;
        let config = parse_str(raw, None).unwrap();
        assert_eq!(config.ui.colors.border, RgbColor::new(1, 2, 3));
        assert_eq!(config.ui.colors.error_fg, RgbColor::new(4, 5, 6));
        assert_eq!(config.ui.colors.selection_fg, RgbColor::new(0, 0, 0));
    }

    #[test]
    fn header_overrides_and_logging_are_read() {
        let raw = r#"
            [api]
            token = "t"
            timeout_secs = 5
            headers = { "X-Keap-API-Key" = "k" }

            [logging]
            file = "/var/log/keapdesk.log"
            level = "debug"
        "#;
        let config = parse_str(raw, None).unwrap();
        assert_eq!(config.api.timeout, Duration::from_secs(5));
        assert_eq!(config.api.headers, vec![("X-Keap-API-Key".to_string(), "k".to_string())]);
        assert_eq!(config.logging.file, PathBuf::from("/var/log/keapdesk.log"));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn tilde_expands_to_home() {
        if let Some(home) = home::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/logs/k.log")), home.join("logs/k.log"));
        }
        assert_eq!(expand_tilde(Path::new("/abs")), PathBuf::from("/abs"));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("configuration file not found"));
    }
}
