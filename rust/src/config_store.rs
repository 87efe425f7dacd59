use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use toml::map::Map;
use toml::Value;

use crate::catalog::{
    Catalog, Category, PromptOption, DEFAULT_MAX_RETRIES, INITIAL_DESCRIPTORS,
    INITIAL_ENVIRONMENT, WARMING_MESSAGE,
};
use crate::workflow::RetryPolicy;

const DEFAULT_PORT: i64 = 3000;
const DEFAULT_TIMEOUT_SEC: f64 = 120.0;
const DEFAULT_AUTH_ENV: &str = "HF_AUTH_KEY";

#[derive(Debug)]
pub struct ConfigStore {
    pub path: PathBuf,
    doc: Value,
}

impl ConfigStore {
    /// Loads the config file, creating it from the built-in defaults when it
    /// does not exist yet. Missing keys are filled in and written back.
    pub fn new(path: PathBuf) -> Result<Self> {
        let doc = if path.exists() {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str(&text)
                .with_context(|| format!("failed to parse TOML: {}", path.display()))?
        } else {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create config directory: {}", parent.display())
                })?;
            }
            Value::Table(Map::new())
        };

        let mut store = Self { path, doc };
        store.normalize_doc();
        store.save()?;
        Ok(store)
    }

    pub fn save(&self) -> Result<()> {
        let text = toml::to_string_pretty(&self.doc).context("failed to serialize TOML")?;
        fs::write(&self.path, text)
            .with_context(|| format!("failed to write config: {}", self.path.display()))
    }

    pub fn server_port(&self) -> u16 {
        self.app_value("server_port")
            .and_then(value_to_i64)
            .and_then(|v| u16::try_from(v).ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_PORT as u16)
    }

    pub fn max_retries(&self) -> u32 {
        self.app_value("max_retries")
            .and_then(value_to_i64)
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(DEFAULT_MAX_RETRIES)
    }

    /// Endpoint the workflow posts prompts to. Empty means this server's own
    /// `/api/generate` route.
    pub fn inference_url(&self, port: u16) -> String {
        self.app_value("inference_url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("http://127.0.0.1:{port}/api/generate"))
    }

    pub fn request_timeout(&self) -> Duration {
        let secs = self
            .app_value("request_timeout_sec")
            .and_then(value_to_f64)
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(DEFAULT_TIMEOUT_SEC);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SEC as u64))
    }

    pub fn retry_on_zero_estimate(&self) -> bool {
        self.app_value("retry_on_zero_estimate")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn warming_message(&self) -> String {
        self.app_string("warming_message", WARMING_MESSAGE)
    }

    pub fn initial_environment(&self) -> String {
        self.app_string("initial_environment", INITIAL_ENVIRONMENT)
    }

    pub fn initial_descriptors(&self) -> String {
        self.app_string("initial_descriptors", INITIAL_DESCRIPTORS)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries(),
            warming_message: self.warming_message(),
            retry_on_zero_estimate: self.retry_on_zero_estimate(),
        }
    }

    pub fn upstream_model_url(&self) -> String {
        self.upstream_table()
            .and_then(|t| t.get("model_url"))
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default()
            .to_string()
    }

    pub fn upstream_auth_env(&self) -> String {
        self.upstream_table()
            .and_then(|t| t.get("auth_token_env"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_AUTH_ENV)
            .to_string()
    }

    /// Built-in lists overridden by every `[[categories]]` entry that names a
    /// known key and carries at least one valid option.
    pub fn catalog(&self) -> Catalog {
        let mut catalog = Catalog::default();
        let categories = self
            .doc
            .as_table()
            .and_then(|root| root.get("categories"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for category_value in categories {
            let Some(table) = category_value.as_table() else {
                continue;
            };
            let Some(category) = table
                .get("key")
                .and_then(Value::as_str)
                .and_then(Category::from_key)
            else {
                continue;
            };
            catalog.set_options(category, options_from_value(table.get("options")));
        }

        catalog
    }

    fn normalize_doc(&mut self) {
        if !self.doc.is_table() {
            self.doc = Value::Table(Map::new());
        }

        {
            let app = self.ensure_table_mut("app");

            let port = app
                .get("server_port")
                .and_then(value_to_i64)
                .filter(|v| (1..=65_535).contains(v))
                .unwrap_or(DEFAULT_PORT);
            app.insert("server_port".to_string(), Value::Integer(port));

            let max_retries = app
                .get("max_retries")
                .and_then(value_to_i64)
                .filter(|v| (0..=i64::from(u32::MAX)).contains(v))
                .unwrap_or(i64::from(DEFAULT_MAX_RETRIES));
            app.insert("max_retries".to_string(), Value::Integer(max_retries));

            let timeout = app
                .get("request_timeout_sec")
                .and_then(value_to_f64)
                .filter(|v| v.is_finite() && *v > 0.0)
                .unwrap_or(DEFAULT_TIMEOUT_SEC);
            app.insert("request_timeout_sec".to_string(), Value::Float(timeout));

            if app
                .get("retry_on_zero_estimate")
                .and_then(Value::as_bool)
                .is_none()
            {
                app.insert("retry_on_zero_estimate".to_string(), Value::Boolean(false));
            }

            for (key, default) in [
                ("inference_url", ""),
                ("warming_message", WARMING_MESSAGE),
                ("initial_environment", INITIAL_ENVIRONMENT),
                ("initial_descriptors", INITIAL_DESCRIPTORS),
            ] {
                if app.get(key).and_then(Value::as_str).is_none() {
                    app.insert(key.to_string(), Value::String(default.to_string()));
                }
            }
        }

        {
            let upstream = self.ensure_table_mut("upstream");
            if upstream.get("model_url").and_then(Value::as_str).is_none() {
                upstream.insert("model_url".to_string(), Value::String(String::new()));
            }
            if upstream
                .get("auth_token_env")
                .and_then(Value::as_str)
                .is_none()
            {
                upstream.insert(
                    "auth_token_env".to_string(),
                    Value::String(DEFAULT_AUTH_ENV.to_string()),
                );
            }
        }

        let catalog = self.catalog();
        let root = self.root_table_mut();
        let categories = Category::ALL
            .into_iter()
            .map(|category| category_to_value(category, catalog.options(category)))
            .collect();
        root.insert("categories".to_string(), Value::Array(categories));
    }

    fn app_value(&self, key: &str) -> Option<&Value> {
        self.doc
            .as_table()
            .and_then(|root| root.get("app"))
            .and_then(Value::as_table)
            .and_then(|t| t.get(key))
    }

    fn app_string(&self, key: &str, default: &str) -> String {
        self.app_value(key)
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| default.to_string())
    }

    fn upstream_table(&self) -> Option<&Map<String, Value>> {
        self.doc
            .as_table()
            .and_then(|root| root.get("upstream"))
            .and_then(Value::as_table)
    }

    fn root_table_mut(&mut self) -> &mut Map<String, Value> {
        if !self.doc.is_table() {
            self.doc = Value::Table(Map::new());
        }
        match &mut self.doc {
            Value::Table(root) => root,
            _ => unreachable!("root was just replaced with a table"),
        }
    }

    fn ensure_table_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let root = self.root_table_mut();
        let entry = root
            .entry(key.to_string())
            .or_insert_with(|| Value::Table(Map::new()));
        if !entry.is_table() {
            *entry = Value::Table(Map::new());
        }
        match entry {
            Value::Table(table) => table,
            _ => unreachable!("entry was just replaced with a table"),
        }
    }
}

fn options_from_value(value: Option<&Value>) -> Vec<PromptOption> {
    let mut options: Vec<PromptOption> = Vec::new();
    let Some(Value::Array(items)) = value else {
        return options;
    };

    for item in items {
        let option = match item {
            Value::String(name) => PromptOption::new(options.len() as u32 + 1, name.trim()),
            Value::Table(table) => {
                let name = table
                    .get("name")
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or_default();
                let id = table
                    .get("id")
                    .and_then(value_to_i64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(options.len() as u32 + 1);
                let unavailable = table
                    .get("unavailable")
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                PromptOption {
                    id,
                    name: name.to_string(),
                    unavailable,
                }
            }
            _ => continue,
        };

        if option.name.is_empty() || options.iter().any(|existing| existing.id == option.id) {
            continue;
        }
        options.push(option);
    }

    options
}

fn category_to_value(category: Category, options: &[PromptOption]) -> Value {
    let mut table = Map::new();
    table.insert("key".to_string(), Value::String(category.key().to_string()));
    table.insert(
        "label".to_string(),
        Value::String(category.label().to_string()),
    );
    let options = options
        .iter()
        .map(|option| {
            let mut entry = Map::new();
            entry.insert("id".to_string(), Value::Integer(i64::from(option.id)));
            entry.insert("name".to_string(), Value::String(option.name.clone()));
            entry.insert("unavailable".to_string(), Value::Boolean(option.unavailable));
            Value::Table(entry)
        })
        .collect();
    table.insert("options".to_string(), Value::Array(options));
    Value::Table(table)
}

fn value_to_f64(value: &Value) -> Option<f64> {
    value
        .as_float()
        .or_else(|| value.as_integer().map(|v| v as f64))
        .or_else(|| value.as_str().and_then(|v| v.parse::<f64>().ok()))
}

fn value_to_i64(value: &Value) -> Option<i64> {
    value
        .as_integer()
        .or_else(|| value.as_float().map(|v| v as i64))
        .or_else(|| value.as_str().and_then(|v| v.parse::<i64>().ok()))
}

#[cfg(test)]
mod tests {
    use super::ConfigStore;
    use crate::catalog::{Catalog, Category, INITIAL_ENVIRONMENT, WARMING_MESSAGE};
    use std::fs;
    use std::path::PathBuf;
    use std::time::Duration;

    fn fixture_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "supernate_config_store_test_{}_{}.toml",
            name,
            std::process::id()
        ));
        path
    }

    #[test]
    fn creates_missing_file_with_defaults() {
        let path = fixture_path("missing");
        fs::remove_file(&path).ok();

        let store = ConfigStore::new(path.clone()).expect("load store");
        assert!(path.exists());
        assert_eq!(store.server_port(), 3000);
        assert_eq!(store.max_retries(), 20);
        assert_eq!(store.warming_message(), WARMING_MESSAGE);
        assert_eq!(store.initial_environment(), INITIAL_ENVIRONMENT);
        assert_eq!(store.upstream_auth_env(), "HF_AUTH_KEY");
        assert_eq!(
            store.inference_url(4100),
            "http://127.0.0.1:4100/api/generate"
        );
        assert_eq!(store.catalog(), Catalog::default());

        let saved = fs::read_to_string(&path).expect("read saved");
        assert!(saved.contains("Greg Rutkowski, Syd Mead, James Gilleard"));

        let reloaded = ConfigStore::new(path.clone()).expect("reload store");
        assert_eq!(reloaded.catalog(), Catalog::default());

        fs::remove_file(path).ok();
    }

    #[test]
    fn invalid_values_fall_back_to_defaults() {
        let path = fixture_path("invalid");
        fs::write(
            &path,
            r#"
[app]
server_port = 99999
max_retries = -4
request_timeout_sec = "soon"
retry_on_zero_estimate = true
inference_url = " https://example.test/api/generate "

[upstream]
model_url = "https://models.example.test/nate"
"#,
        )
        .expect("fixture write");

        let store = ConfigStore::new(path.clone()).expect("load store");
        assert_eq!(store.server_port(), 3000);
        assert_eq!(store.max_retries(), 20);
        assert_eq!(store.request_timeout(), Duration::from_secs(120));
        assert!(store.retry_on_zero_estimate());
        assert_eq!(
            store.inference_url(3000),
            "https://example.test/api/generate"
        );
        assert_eq!(
            store.upstream_model_url(),
            "https://models.example.test/nate"
        );

        let policy = store.retry_policy();
        assert_eq!(policy.max_retries, 20);
        assert!(policy.retry_on_zero_estimate);

        fs::remove_file(path).ok();
    }

    #[test]
    fn categories_override_built_in_lists() {
        let path = fixture_path("categories");
        fs::write(
            &path,
            r#"
[app]
max_retries = 5

[[categories]]
key = "subject"
options = [
  { id = 10, name = "Batman" },
  { id = 11, name = "  Robin  ", unavailable = true },
  { id = 10, name = "duplicate id" },
  { id = 12, name = "" },
]

[[categories]]
key = "vibe"
options = ["noir", "rainy"]

[[categories]]
key = "medium"
options = []

[[categories]]
key = "mood"
options = ["ignored"]
"#,
        )
        .expect("fixture write");

        let store = ConfigStore::new(path.clone()).expect("load store");
        assert_eq!(store.max_retries(), 5);

        let catalog = store.catalog();
        let subjects = catalog.options(Category::Subject);
        assert_eq!(subjects.len(), 2);
        assert_eq!(subjects[0].name, "Batman");
        assert_eq!(subjects[1].name, "Robin");
        assert!(subjects[1].unavailable);

        let vibes = catalog.options(Category::Vibe);
        assert_eq!(vibes[0].id, 1);
        assert_eq!(vibes[1].name, "rainy");

        let defaults = Catalog::default();
        assert_eq!(
            catalog.options(Category::Medium),
            defaults.options(Category::Medium)
        );
        assert_eq!(
            catalog.options(Category::Style),
            defaults.options(Category::Style)
        );

        let saved = fs::read_to_string(&path).expect("read saved");
        assert!(!saved.contains("mood"));
        assert!(saved.contains("Batman"));

        fs::remove_file(path).ok();
    }
}
