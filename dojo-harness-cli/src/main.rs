use anyhow::Context;
use clap::{Parser, Subcommand};
use dojo_harness_core::ProcessOutput;
use dojo_harness_runner::{find_failure_marker, CommandRunner, ProjectLayout};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;
use std::thread;
use tracing::debug;

#[derive(Parser)]
#[command(name = "dojo-harness")]
#[command(about = "Run and inspect the dojo binary the way its test suite does", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Project root (defaults to DOJO_HARNESS_ROOT, then the discovered root)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Binary name under <root>/bin
    #[arg(long, global = true)]
    bin: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the absolute path of the binary under test
    Locate,

    /// Run the binary, wait for it and print what it wrote
    Run {
        /// Environment override, repeatable
        #[arg(short, long = "env", value_name = "KEY=VALUE")]
        env: Vec<String>,

        /// Start from an empty environment instead of the current one
        #[arg(long)]
        clear_env: bool,

        /// Launch through the shell whenever an environment override is given
        #[arg(long)]
        legacy_shell: bool,

        /// Fail if stderr mentions "warn" or "error"
        #[arg(long)]
        check_clean: bool,

        /// Print the full result as JSON
        #[arg(long)]
        json: bool,

        /// Arguments passed to the binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Run a raw command line through /bin/sh
    Shell {
        command: String,
    },

    /// Source the bash-function script, then start the binary under bash
    BashFunc {
        /// Text written to the child's stdin while its output is collected
        #[arg(long)]
        stdin: Option<String>,

        /// Arguments passed to the binary
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },

    /// Look for "warn" / "error" in a file, or stdin when no file is given
    Check {
        file: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let layout = resolve_layout(cli.root, cli.bin)?;
    debug!(root = %layout.root().display(), binary = %layout.binary_name(), "Using project layout");
    let runner = CommandRunner::new(layout);

    match cli.command {
        Commands::Locate => {
            println!("{}", runner.layout().executable().display());
        }
        Commands::Run {
            env,
            clear_env,
            legacy_shell,
            check_clean,
            json,
            args,
        } => {
            let env_override = build_env_override(&env, clear_env)?;
            let output = if legacy_shell {
                runner.run_legacy(runner.layout().executable(), &args, env_override.as_ref())?
            } else {
                runner.run_dojo(&args, env_override.as_ref())?
            };
            print_output(&output, json)?;

            if check_clean {
                if let Some(marker) = find_failure_marker(&output.stderr) {
                    eprintln!("dojo-harness: stderr contains \"{}\"", marker);
                    process::exit(1);
                }
            }
            process::exit(output.exit_code.unwrap_or(1));
        }
        Commands::Shell { command } => {
            let output = runner.run_shell(&command)?;
            print_output(&output, false)?;
            process::exit(output.exit_code.unwrap_or(1));
        }
        Commands::BashFunc { stdin, args } => {
            let mut live = runner.spawn_dojo_with_bash_function(&args, None)?;
            // Feed stdin on its own thread so a child that fills stdout
            // before reading cannot block us.
            let writer = match (stdin, live.take_stdin()) {
                (Some(text), Some(mut pipe)) => {
                    Some(thread::spawn(move || pipe.write_all(text.as_bytes())))
                }
                _ => None,
            };
            let output = live.wait()?;
            if let Some(writer) = writer {
                match writer.join() {
                    Ok(result) => result.context("Failed to write stdin")?,
                    Err(_) => anyhow::bail!("stdin writer thread panicked"),
                }
            }
            print_output(&output, false)?;
            process::exit(output.exit_code.unwrap_or(1));
        }
        Commands::Check { file } => {
            let text = match file {
                Some(path) => fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?,
                None => {
                    let mut text = String::new();
                    io::stdin().read_to_string(&mut text)?;
                    text
                }
            };

            match find_failure_marker(&text) {
                Some(marker) => {
                    eprintln!("Found \"{}\"", marker);
                    process::exit(1);
                }
                None => println!("No warnings or errors"),
            }
        }
    }

    Ok(())
}

fn resolve_layout(root: Option<PathBuf>, bin: Option<String>) -> anyhow::Result<ProjectLayout> {
    let layout = match root {
        Some(root) => ProjectLayout::new(root)?,
        None => ProjectLayout::from_env()?,
    };
    Ok(match bin {
        Some(bin) => layout.try_with_binary_name(bin)?,
        None => layout,
    })
}

/// `None` unless the caller asked for an override. Overrides are layered on
/// the current environment unless `clear_env` is set.
fn build_env_override(
    pairs: &[String],
    clear_env: bool,
) -> anyhow::Result<Option<HashMap<String, String>>> {
    if pairs.is_empty() && !clear_env {
        return Ok(None);
    }

    let mut env_map: HashMap<String, String> = if clear_env {
        HashMap::new()
    } else {
        env::vars().collect()
    };

    for pair in pairs {
        let (key, value) = pair
            .split_once('=')
            .filter(|(key, _)| !key.is_empty())
            .ok_or_else(|| {
                dojo_harness_core::HarnessError::InvalidConfiguration(format!(
                    "expected KEY=VALUE, got {:?}",
                    pair
                ))
            })?;
        env_map.insert(key.to_string(), value.to_string());
    }

    Ok(Some(env_map))
}

fn print_output(output: &ProcessOutput, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(output)?);
    } else {
        print!("{}", output.stdout);
        eprint!("{}", output.stderr);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_env_override_none_without_flags() {
        assert!(build_env_override(&[], false).unwrap().is_none());
    }

    #[test]
    fn test_build_env_override_clear_env() {
        let env = build_env_override(&["A=1".to_string()], true).unwrap().unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env.get("A").map(String::as_str), Some("1"));
    }

    #[test]
    fn test_build_env_override_keeps_value_with_equals() {
        let env = build_env_override(&["OPTS=a=b".to_string()], true).unwrap().unwrap();
        assert_eq!(env.get("OPTS").map(String::as_str), Some("a=b"));
    }

    #[test]
    fn test_build_env_override_rejects_malformed_pairs() {
        assert!(build_env_override(&["NOVALUE".to_string()], true).is_err());
        assert!(build_env_override(&["=x".to_string()], true).is_err());
    }

    #[test]
    fn test_cli_parses_trailing_args() {
        let cli = Cli::parse_from(["dojo-harness", "run", "-e", "X=1", "--", "-c", "echo hi"]);
        match cli.command {
            Commands::Run { env, args, .. } => {
                assert_eq!(env, vec!["X=1".to_string()]);
                assert_eq!(args, vec!["-c".to_string(), "echo hi".to_string()]);
            }
            _ => panic!("Expected run"),
        }
    }
}
