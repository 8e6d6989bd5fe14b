//! Applies `apk-config.json` to the Capacitor project that wraps the website.

pub mod version;
pub mod web;

use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use anyhow::{Context, Result, bail};
use regex::{NoExpand, Regex};
use serde_json::{Map, Value, json};
pub use version::{VersionBump, bump_version};
pub use web::sync_web_dir;
use web2apk_core::config::{AppConfig, ProjectConfig};

const CAPACITOR_CONFIG_TS: &str = "capacitor.config.ts";
const CAPACITOR_CONFIG_JSON: &str = "capacitor.config.json";
const PACKAGE_JSON: &str = "package.json";
const MANIFEST: &str = "android/app/src/main/AndroidManifest.xml";
const RES_DIR: &str = "android/app/src/main/res";
const STYLES: &str = "android/app/src/main/res/values/styles.xml";
const ICON_FILE: &str = "ic_launcher.png";
const ICON_ATTRIBUTE: &str = r#"android:icon="@mipmap/ic_launcher""#;

/// Resource directories receiving a copy of the launcher icon.
const ICON_DIRS: [&str; 10] = [
    "mipmap-mdpi",
    "mipmap-hdpi",
    "mipmap-xhdpi",
    "mipmap-xxhdpi",
    "mipmap-xxxhdpi",
    "drawable",
    "drawable-hdpi",
    "drawable-xhdpi",
    "drawable-xxhdpi",
    "drawable-xxxhdpi",
];

/// The Capacitor project on disk.
#[derive(Debug, Clone)]
pub struct Project {
    root: PathBuf,
    web_dir: PathBuf,
}

/// Files changed by [`Project::apply`], and the steps it skipped.
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub updated: Vec<PathBuf>,
    pub skipped: Vec<String>,
}

impl ApplyReport {
    fn skip(&mut self, reason: String) {
        tracing::warn!("{}", reason);
        self.skipped.push(reason);
    }
}

impl Project {
    /// `web_dir` is relative to `root`.
    pub fn new(root: impl Into<PathBuf>, web_dir: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), web_dir: web_dir.into() }
    }

    pub fn from_config(config: &ProjectConfig) -> Self {
        Self::new(&config.root, &config.web_dir)
    }

    pub fn root(&self) -> &Path { &self.root }

    pub fn web_dir(&self) -> PathBuf { self.root.join(&self.web_dir) }

    /// Write the app settings into the Capacitor, npm and Android project files.
    pub fn apply(&self, app: &AppConfig) -> Result<ApplyReport> {
        validate(app)?;
        let mut report = ApplyReport::default();
        self.apply_capacitor_config(app, &mut report)?;
        self.apply_package_json(app, &mut report)?;
        if app.icon.enabled {
            self.apply_icon(app, &mut report)?;
        }
        if app.splash.enabled {
            self.apply_splash(app, &mut report)?;
        }
        tracing::info!(
            "Applied {} {} ({} files updated, {} skipped)",
            app.app_id,
            app.version,
            report.updated.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    fn apply_capacitor_config(&self, app: &AppConfig, report: &mut ApplyReport) -> Result<()> {
        let ts_path = self.root.join(CAPACITOR_CONFIG_TS);
        if ts_path.is_file() {
            let source = read(&ts_path)?;
            let patched = patch_capacitor_ts(&source, app);
            if patched != source {
                write(&ts_path, &patched)?;
            }
            report.updated.push(ts_path);
            return Ok(());
        }

        let json_path = self.root.join(CAPACITOR_CONFIG_JSON);
        let mut config = if json_path.is_file() { read_json(&json_path)? } else { Map::new() };
        config.insert("appId".into(), json!(app.app_id));
        config.insert("appName".into(), json!(app.app_name));
        config.insert("webDir".into(), json!(self.web_dir.to_string_lossy().replace('\\', "/")));
        let server = Map::from_iter([("androidScheme".into(), json!("https"))]);
        merge_object(&mut config, "server", server);
        let android = Map::from_iter([("allowMixedContent".into(), json!(true))]);
        merge_object(&mut config, "android", android);
        write_json(&json_path, &config)?;
        report.updated.push(json_path);
        Ok(())
    }

    fn apply_package_json(&self, app: &AppConfig, report: &mut ApplyReport) -> Result<()> {
        let path = self.root.join(PACKAGE_JSON);
        if !path.is_file() {
            report.skip(format!("{PACKAGE_JSON} not found"));
            return Ok(());
        }
        let mut package = read_json(&path)?;
        package.insert("name".into(), json!(app.app_id.replace('.', "-")));
        package.insert("description".into(), json!(app.description));
        package.insert("version".into(), json!(app.version));
        write_json(&path, &package)?;
        report.updated.push(path);
        Ok(())
    }

    fn apply_icon(&self, app: &AppConfig, report: &mut ApplyReport) -> Result<()> {
        let Some(icon) = app.icon.path.as_ref().map(|p| self.root.join(p)) else {
            report.skip("Icon is enabled but has no path".to_string());
            return Ok(());
        };
        if !icon.is_file() {
            report.skip(format!("Icon {} not found", icon.display()));
            return Ok(());
        }
        let res_dir = self.root.join(RES_DIR);
        if !res_dir.is_dir() {
            report.skip(format!("{RES_DIR} not found, add the Android platform first"));
            return Ok(());
        }
        for dir in ICON_DIRS {
            let target_dir = res_dir.join(dir);
            fs::create_dir_all(&target_dir)?;
            let target = target_dir.join(ICON_FILE);
            fs::copy(&icon, &target)
                .with_context(|| format!("Failed to copy icon to {}", target.display()))?;
            report.updated.push(target);
        }

        let manifest = self.root.join(MANIFEST);
        if !manifest.is_file() {
            report.skip(format!("{MANIFEST} not found"));
            return Ok(());
        }
        let source = read(&manifest)?;
        if !source.contains(ICON_ATTRIBUTE) {
            static ICON: OnceLock<Regex> = OnceLock::new();
            let regex = ICON.get_or_init(|| Regex::new(r#"android:icon="[^"]*""#).unwrap());
            if regex.is_match(&source) {
                write(&manifest, &regex.replace(&source, NoExpand(ICON_ATTRIBUTE)))?;
                report.updated.push(manifest);
            } else {
                report.skip(format!("{MANIFEST} has no android:icon attribute"));
            }
        }
        Ok(())
    }

    fn apply_splash(&self, app: &AppConfig, report: &mut ApplyReport) -> Result<()> {
        let image = app.splash.path.as_ref().map(|p| self.root.join(p));
        if !image.as_ref().is_some_and(|p| p.is_file()) {
            report.skip("Splash is enabled but its image was not found".to_string());
            return Ok(());
        }
        let styles = self.root.join(STYLES);
        if !styles.is_file() {
            report.skip(format!("{STYLES} not found"));
            return Ok(());
        }
        static COLOR: OnceLock<Regex> = OnceLock::new();
        let regex = COLOR.get_or_init(|| Regex::new(r#"android:color="[^"]*""#).unwrap());
        let source = read(&styles)?;
        if !regex.is_match(&source) {
            report.skip(format!("{STYLES} has no android:color attribute"));
            return Ok(());
        }
        let attribute = format!(r#"android:color="{}""#, app.splash.color);
        write(&styles, &regex.replace(&source, NoExpand(&attribute)))?;
        report.updated.push(styles);
        Ok(())
    }
}

fn validate(app: &AppConfig) -> Result<()> {
    static APP_ID: OnceLock<Regex> = OnceLock::new();
    static COLOR: OnceLock<Regex> = OnceLock::new();
    if app.app_name.trim().is_empty() {
        bail!("appName must not be empty");
    }
    let app_id = APP_ID.get_or_init(|| {
        Regex::new(r"^[A-Za-z][A-Za-z0-9_]*(?:\.[A-Za-z][A-Za-z0-9_]*)+$").unwrap()
    });
    if !app_id.is_match(&app.app_id) {
        bail!("appId '{}' is not a valid Android package name, e.g. com.example.app", app.app_id);
    }
    let color = COLOR.get_or_init(|| {
        Regex::new(r"^#(?:[0-9A-Fa-f]{3}|[0-9A-Fa-f]{6}|[0-9A-Fa-f]{8})$").unwrap()
    });
    if app.splash.enabled && !color.is_match(&app.splash.color) {
        bail!("Splash color '{}' is not a hex color", app.splash.color);
    }
    version::parse_version(&app.version)?;
    Ok(())
}

/// Replace the `appId` and `appName` values of a TypeScript Capacitor config.
///
/// Each value is matched as a whole string literal, escapes included.
fn patch_capacitor_ts(source: &str, app: &AppConfig) -> String {
    static APP_ID: OnceLock<Regex> = OnceLock::new();
    static APP_NAME: OnceLock<Regex> = OnceLock::new();
    let app_id = APP_ID.get_or_init(|| string_property("appId"));
    let app_name = APP_NAME.get_or_init(|| string_property("appName"));
    // JSON string literals are valid TypeScript string literals.
    let patched = app_id.replace(source, NoExpand(&format!("appId: {}", json!(app.app_id))));
    app_name.replace(&patched, NoExpand(&format!("appName: {}", json!(app.app_name)))).into_owned()
}

/// `key: <single or double quoted string literal>`
fn string_property(key: &str) -> Regex {
    Regex::new(&format!(r#"{key}:\s*(?:"(?:[^"\\\r\n]|\\.)*"|'(?:[^'\\\r\n]|\\.)*')"#))
        .unwrap()
}

/// Set `values` inside the object at `key`, keeping its other members.
fn merge_object(map: &mut Map<String, Value>, key: &str, values: Map<String, Value>) {
    let entry = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
    match entry {
        Value::Object(object) => object.extend(values),
        other => *other = Value::Object(values),
    }
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::debug!("Updated {}", path.display());
    Ok(())
}

fn read_json(path: &Path) -> Result<Map<String, Value>> {
    serde_json::from_str(&read(path)?)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json(path: &Path, value: &Map<String, Value>) -> Result<()> {
    let mut contents = serde_json::to_string_pretty(value)?;
    contents.push('\n');
    write(path, &contents)
}
