//! Config validation CLI tool
//!
//! Validates a pguard configuration file and reports any errors.

use pguard_config::{ConfigError, ReloadMethod, CURRENT_CONFIG_VERSION};
use pguard_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a pguard configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match pguard_config::load_config(&config_path) {
        Ok(policy) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Hosts file: {}", policy.enforcement.hosts_path.display());
            match &policy.enforcement.write_command {
                Some(cmd) => println!("  Write via: {}", cmd.join(" ")),
                None => println!("  Write via: direct file write"),
            }
            match &policy.enforcement.reload {
                ReloadMethod::Signal { pid_file } => {
                    println!("  Reload via: SIGHUP to pid in {}", pid_file.display())
                }
                ReloadMethod::Command(cmd) => println!("  Reload via: {}", cmd.join(" ")),
            }

            println!();
            println!("Conditional domains ({}):", policy.domains.conditional().len());
            for domain in policy.domains.conditional() {
                println!("  - {}", domain);
            }
            println!("Always blocked ({}):", policy.domains.always_blocked().len());
            for domain in policy.domains.always_blocked() {
                println!("  - {}", domain);
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
