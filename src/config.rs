use anyhow::{Context, Result, bail};
use colored::*;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::command::{CommandConfig, Console, Mode, OutputTarget, StdinSource, StdioPolicy};
use crate::runner::task::Target;
use crate::utils::prompt_producer;

pub const BUILD_FILE: &str = "kiln.toml";

#[derive(Debug, Deserialize)]
pub struct KilnConfig {
    pub project: Option<ProjectConfig>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub command: BTreeMap<String, CommandDecl>,
    #[serde(default)]
    pub target: BTreeMap<String, Target>,

    /// Every value each variable took, in load order: (source, value).
    #[serde(skip)]
    pub env_provenance: HashMap<String, Vec<(String, String)>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub version: Option<String>,
    pub authors: Option<Vec<String>>,
    pub description: Option<String>,
}

/// `[command.<name>]` table.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CommandDecl {
    /// Executable to declare; defaults to the table key.
    pub exec: Option<String>,
    #[serde(default, rename = "async")]
    pub asynchronous: bool,
    pub mode: Option<Mode>,
    pub die: Option<bool>,
    pub cwd: Option<PathBuf>,
    pub env: Option<HashMap<String, String>>,
    pub stdin: Option<StdinDecl>,
    pub stdout: Option<OutputDecl>,
    pub stderr: Option<OutputDecl>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum StdinDecl {
    Integer(i64),
    Float(f64),
    /// A policy name (`inherit`, `pipe`, `ignore`) or a literal payload.
    Text(String),
    File { file: PathBuf },
    Prompt { prompt: String },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(untagged)]
pub enum OutputDecl {
    Policy(StdioPolicy),
    File {
        file: PathBuf,
        #[serde(default)]
        append: bool,
    },
}

fn resolve_in(dir: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        dir.join(p)
    }
}

impl CommandDecl {
    pub fn identifier<'a>(&'a self, key: &'a str) -> &'a str {
        self.exec.as_deref().unwrap_or(key)
    }

    /// Build the command configuration. Relative paths, including the
    /// default working directory, are taken from the build file's directory.
    /// With `dry_run` set, output files are left untouched.
    pub fn to_config(&self, dir: &Path, console: &Console, dry_run: bool) -> Result<CommandConfig> {
        let cwd = self
            .cwd
            .as_deref()
            .map(|c| resolve_in(dir, c))
            .unwrap_or_else(|| dir.to_path_buf());

        let mut config = CommandConfig::new()
            .asynchronous(self.asynchronous)
            .cwd(cwd)
            .mode(self.mode.unwrap_or_default())
            .die_on_failure(self.die.unwrap_or(true))
            .console(console.clone());

        if let Some(vars) = &self.env {
            config = config.env(vars.clone());
        }

        if let Some(stdin) = &self.stdin {
            config = config.stdin(match stdin {
                StdinDecl::Integer(n) => StdinSource::number(n),
                StdinDecl::Float(n) => StdinSource::number(n),
                StdinDecl::Text(s) => StdinSource::text(s),
                StdinDecl::File { file } => {
                    let path = resolve_in(dir, file);
                    let f = File::open(&path)
                        .with_context(|| format!("Failed to open stdin file: {}", path.display()))?;
                    StdinSource::stream(f)
                }
                StdinDecl::Prompt { prompt } => prompt_producer(prompt.clone(), console.clone()),
            });
        }

        if let Some(out) = &self.stdout {
            config = config.stdout(output_target(out, dir, dry_run)?);
        }
        if let Some(err) = &self.stderr {
            config = config.stderr(output_target(err, dir, dry_run)?);
        }

        Ok(config)
    }
}

fn output_target(decl: &OutputDecl, dir: &Path, dry_run: bool) -> Result<OutputTarget> {
    match decl {
        OutputDecl::Policy(p) => Ok(OutputTarget::Policy(*p)),
        OutputDecl::File { .. } if dry_run => Ok(OutputTarget::Policy(StdioPolicy::Ignore)),
        OutputDecl::File { file, append } => {
            let path = resolve_in(dir, file);
            let mut opts = OpenOptions::new();
            if *append {
                opts.create(true).append(true);
            } else {
                opts.create(true).write(true).truncate(true);
            }
            let f = opts
                .open(&path)
                .with_context(|| format!("Failed to open output file: {}", path.display()))?;
            Ok(OutputTarget::sink(f))
        }
    }
}

fn record(config: &mut KilnConfig, source: &str, key: &str, value: &str) {
    config
        .env_provenance
        .entry(key.to_string())
        .or_default()
        .push((source.to_string(), value.to_string()));
}

/// Load `<dir>/<file_name>` and layer `.env` (or `.env.<KILN_ENV>`) on top
/// of its `[env]` table.
pub fn load_config(dir: &Path, file_name: &str) -> Result<KilnConfig> {
    let config_path = dir.join(file_name);
    if !config_path.exists() {
        bail!("No \"{}\" found. Bailing out!", file_name);
    }
    let content = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read {}", file_name))?;

    let mut config: KilnConfig =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", file_name))?;

    let base: Vec<(String, String)> = config.env.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    for (k, v) in base {
        record(&mut config, file_name, &k, &v);
    }

    let env_filename = env::var("KILN_ENV")
        .map(|v| format!(".env.{}", v))
        .unwrap_or_else(|_| ".env".to_string());
    let env_path = dir.join(&env_filename);

    if env_path.exists() {
        eprintln!("{} Loading environment from: {}", "🌿".green(), env_filename.bold());

        // Collected into the map only; applied when the project is run.
        for item in dotenvy::from_path_iter(&env_path)? {
            let (key, val) = item?;
            record(&mut config, &env_filename, &key, &val);
            config.env.insert(key, val);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_missing_build_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path(), BUILD_FILE).unwrap_err();
        assert_eq!(err.to_string(), "No \"kiln.toml\" found. Bailing out!");
    }

    #[test]
    fn test_parse_commands_and_targets() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            BUILD_FILE,
            r#"
[project]
name = "demo"

[env]
CFLAGS = "-Wall"

[command.cc]
exec = "cc"
async = true
mode = "forward-out"

[command.yes]
exec = "make"
die = false
stdin = "y\n"
stdout = "inherit"
stderr = { file = "err.log", append = true }

[command.counter]
exec = "cat"
stdin = 42

[command.repl]
exec = "cat"
stdin = { prompt = "Cat >" }

[target.build]
description = "Compile"
steps = ["cc ${CFLAGS} main.c", { run = "cc", args = ["-c"] }]

[target.quick]
steps = ["cc main.c"]
"#,
        );

        let config = load_config(dir.path(), BUILD_FILE).unwrap();
        assert_eq!(config.project.unwrap().name.as_deref(), Some("demo"));
        assert_eq!(config.env["CFLAGS"], "-Wall");

        let cc = &config.command["cc"];
        assert!(cc.asynchronous);
        assert_eq!(cc.mode, Some(Mode::ForwardOut));
        assert_eq!(cc.identifier("cc"), "cc");

        let yes = &config.command["yes"];
        assert_eq!(yes.identifier("yes"), "make");
        assert_eq!(yes.die, Some(false));
        assert!(matches!(yes.stdin, Some(StdinDecl::Text(ref s)) if s == "y\n"));
        assert!(matches!(yes.stdout, Some(OutputDecl::Policy(StdioPolicy::Inherit))));
        assert!(matches!(yes.stderr, Some(OutputDecl::File { append: true, .. })));

        assert!(matches!(config.command["counter"].stdin, Some(StdinDecl::Integer(42))));
        assert!(matches!(config.command["repl"].stdin, Some(StdinDecl::Prompt { .. })));

        assert_eq!(config.target["build"].description(), Some("Compile"));
        assert_eq!(config.target["build"].steps().len(), 2);
        assert_eq!(config.target["quick"].steps().len(), 1);
    }

    #[test]
    fn test_dotenv_overrides_env_table() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), BUILD_FILE, "[env]\nMODE = \"debug\"\nKEEP = \"1\"\n");
        write(dir.path(), ".env", "MODE=release\n");

        let config = load_config(dir.path(), BUILD_FILE).unwrap();
        assert_eq!(config.env["MODE"], "release");
        assert_eq!(config.env["KEEP"], "1");
        let history = &config.env_provenance["MODE"];
        assert_eq!(history.len(), 2);
        assert_eq!(history[1], (".env".to_string(), "release".to_string()));
    }

    #[test]
    fn test_decl_to_config_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let decl = CommandDecl::default();
        let (console, _) = Console::capture();
        let config = decl.to_config(dir.path(), &console, false).unwrap();
        assert!(!config.asynchronous);
        assert!(config.die_on_failure);
        assert_eq!(config.mode, Mode::ForwardBoth);
        assert_eq!(config.cwd.as_deref(), Some(dir.path()));
        assert!(matches!(config.stdin, StdinSource::Absent));
    }

    #[test]
    fn test_decl_to_config_streams() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "input.txt", "data");
        let decl = CommandDecl {
            stdin: Some(StdinDecl::File { file: "input.txt".into() }),
            stdout: Some(OutputDecl::File { file: "out.log".into(), append: false }),
            stderr: Some(OutputDecl::Policy(StdioPolicy::Ignore)),
            cwd: Some("sub".into()),
            ..Default::default()
        };
        let (console, _) = Console::capture();
        let config = decl.to_config(dir.path(), &console, false).unwrap();
        assert!(matches!(config.stdin, StdinSource::Stream(_)));
        assert!(matches!(config.stdout, OutputTarget::Sink(_)));
        assert!(matches!(config.stderr, OutputTarget::Policy(StdioPolicy::Ignore)));
        assert_eq!(config.cwd, Some(dir.path().join("sub")));
        assert!(dir.path().join("out.log").exists());
    }

    #[test]
    fn test_dry_run_leaves_output_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "build.log", "previous run");
        let decl = CommandDecl {
            stdout: Some(OutputDecl::File { file: "build.log".into(), append: false }),
            ..Default::default()
        };
        let (console, _) = Console::capture();
        let config = decl.to_config(dir.path(), &console, true).unwrap();
        assert!(matches!(config.stdout, OutputTarget::Policy(StdioPolicy::Ignore)));
        assert_eq!(fs::read_to_string(dir.path().join("build.log")).unwrap(), "previous run");
    }

    #[test]
    fn test_unknown_command_field_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), BUILD_FILE, "[command.cc]\nmoed = \"manual\"\n");
        assert!(load_config(dir.path(), BUILD_FILE).is_err());
    }
}
