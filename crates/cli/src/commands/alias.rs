//! Alias management commands
//!
//! Aliases are named references to S3-compatible storage endpoints,
//! including connection details, credentials and retry settings.

use clap::Subcommand;
use serde::Serialize;

use crate::exit_code::ExitCode;
use crate::output::{Formatter, OutputConfig};
use bfs_core::{Alias, AliasManager, RetryOn, RetryPolicy};

/// Alias subcommands for managing storage service connections
#[derive(Subcommand, Debug)]
pub enum AliasCommands {
    /// Add or update an alias
    Set(SetArgs),

    /// List all configured aliases
    List(ListArgs),

    /// Remove an alias
    Remove(RemoveArgs),
}

/// Arguments for the `alias set` command
#[derive(clap::Args, Debug)]
pub struct SetArgs {
    /// Alias name (e.g., "local", "s3", "minio")
    pub name: String,

    /// S3 endpoint URL (e.g., "http://localhost:9000", "https://s3.amazonaws.com")
    pub endpoint: String,

    /// Access key ID
    pub access_key: String,

    /// Secret access key
    pub secret_key: String,

    /// AWS region
    #[arg(long, default_value = "us-east-1")]
    pub region: String,

    /// Bucket lookup style: auto, path, or dns
    #[arg(long, default_value = "auto")]
    pub bucket_lookup: String,

    /// Allow plain HTTP endpoints other than localhost
    #[arg(long, default_value = "false")]
    pub insecure: bool,

    /// Attempts per call, including the first (1 disables retries)
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Retry every failure, not only transient ones
    #[arg(long, default_value = "false")]
    pub retry_any: bool,

    /// Use this alias when a command does not name one
    #[arg(long, default_value = "false")]
    pub default: bool,
}

/// Arguments for the `alias list` command
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Show full details including region and lookup style
    #[arg(short, long)]
    pub long: bool,
}

/// Arguments for the `alias remove` command
#[derive(clap::Args, Debug)]
pub struct RemoveArgs {
    /// Name of the alias to remove
    pub name: String,
}

/// JSON output for alias list
#[derive(Serialize)]
struct AliasListOutput {
    aliases: Vec<AliasInfo>,
}

/// Alias information for JSON output (without credentials)
#[derive(Debug, Serialize)]
struct AliasInfo {
    name: String,
    endpoint: String,
    region: String,
    bucket_lookup: String,
    max_attempts: u32,
    is_default: bool,
}

impl AliasInfo {
    fn new(alias: &Alias, default: Option<&str>) -> Self {
        Self {
            name: alias.name.clone(),
            endpoint: alias.endpoint.clone(),
            region: alias.region.clone(),
            bucket_lookup: alias.bucket_lookup.clone(),
            max_attempts: alias.retry_policy().max_attempts,
            is_default: default == Some(alias.name.as_str()),
        }
    }
}

/// JSON output for alias set/remove operations
#[derive(Serialize)]
struct AliasOperationOutput {
    success: bool,
    alias: String,
    message: String,
}

/// Execute an alias subcommand
pub async fn execute(cmd: AliasCommands, output_config: OutputConfig) -> ExitCode {
    let formatter = Formatter::new(output_config);
    let alias_manager = match AliasManager::new() {
        Ok(am) => am,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from_error(&e);
        }
    };

    match cmd {
        AliasCommands::Set(args) => execute_set(args, &alias_manager, &formatter),
        AliasCommands::List(args) => execute_list(args, &alias_manager, &formatter),
        AliasCommands::Remove(args) => execute_remove(args, &alias_manager, &formatter),
    }
}

fn build_alias(args: SetArgs) -> Alias {
    let mut alias = Alias::new(args.name, args.endpoint, args.access_key, args.secret_key);
    alias.region = args.region;
    alias.bucket_lookup = args.bucket_lookup;
    alias.insecure = args.insecure;

    if args.max_attempts.is_some() || args.retry_any {
        let mut policy = RetryPolicy::new();
        if let Some(attempts) = args.max_attempts {
            policy = policy.max_attempts(attempts);
        }
        if args.retry_any {
            policy = policy.retry_on(RetryOn::Any);
        }
        alias.retry = Some(policy);
    }
    alias
}

fn report_operation(formatter: &Formatter, name: &str, message: String) {
    if formatter.is_json() {
        formatter.json(&AliasOperationOutput {
            success: true,
            alias: name.to_string(),
            message,
        });
    } else {
        formatter.success(&message);
    }
}

fn execute_set(args: SetArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    if args.name.is_empty() {
        formatter.error("Alias name cannot be empty");
        return ExitCode::UsageError;
    }

    let make_default = args.default;
    let alias = build_alias(args);
    let name = alias.name.clone();

    let result = manager.set(alias).and_then(|()| {
        if make_default {
            manager.set_default(&name)
        } else {
            Ok(())
        }
    });

    match result {
        Ok(()) => {
            report_operation(formatter, &name, format!("Alias '{name}' configured successfully"));
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from_error(&e)
        }
    }
}

fn execute_list(args: ListArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    let config = match manager.config_manager().load() {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from_error(&e);
        }
    };
    let default = config.defaults.alias.as_deref();
    let aliases: Vec<AliasInfo> = config
        .aliases
        .iter()
        .map(|alias| AliasInfo::new(alias, default))
        .collect();

    if formatter.is_json() {
        formatter.json(&AliasListOutput { aliases });
    } else if aliases.is_empty() {
        formatter.println("No aliases configured.");
    } else {
        for alias in &aliases {
            let marker = if alias.is_default { "*" } else { " " };
            if args.long {
                formatter.println(&format!(
                    "{marker} {:<12} {} (region: {}, lookup: {}, attempts: {})",
                    alias.name, alias.endpoint, alias.region, alias.bucket_lookup, alias.max_attempts
                ));
            } else {
                formatter.println(&format!("{marker} {:<12} {}", alias.name, alias.endpoint));
            }
        }
    }
    ExitCode::Success
}

fn execute_remove(args: RemoveArgs, manager: &AliasManager, formatter: &Formatter) -> ExitCode {
    match manager.remove(&args.name) {
        Ok(()) => {
            report_operation(
                formatter,
                &args.name,
                format!("Alias '{}' removed successfully", args.name),
            );
            ExitCode::Success
        }
        Err(e) => {
            formatter.error(&e.to_string());
            ExitCode::from_error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bfs_core::ConfigManager;
    use tempfile::TempDir;

    fn set_args(name: &str) -> SetArgs {
        SetArgs {
            name: name.to_string(),
            endpoint: "http://localhost:9000".to_string(),
            access_key: "accesskey".to_string(),
            secret_key: "secretkey".to_string(),
            region: "us-east-1".to_string(),
            bucket_lookup: "auto".to_string(),
            insecure: false,
            max_attempts: None,
            retry_any: false,
            default: false,
        }
    }

    fn temp_manager() -> (AliasManager, TempDir) {
        let dir = TempDir::new().unwrap();
        let manager = AliasManager::with_config_manager(ConfigManager::with_path(
            dir.path().join("config.toml"),
        ));
        (manager, dir)
    }

    fn quiet() -> Formatter {
        Formatter::new(OutputConfig {
            quiet: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_build_alias_without_retry_flags_keeps_default_policy() {
        let alias = build_alias(set_args("local"));
        assert!(alias.retry.is_none());
        assert_eq!(alias.region, "us-east-1");
    }

    #[test]
    fn test_build_alias_with_retry_flags() {
        let mut args = set_args("local");
        args.max_attempts = Some(1);
        args.retry_any = true;
        let policy = build_alias(args).retry.unwrap();
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.retry_on, RetryOn::Any);
    }

    #[test]
    fn test_set_default_and_remove() {
        let (manager, _dir) = temp_manager();
        let mut args = set_args("local");
        args.default = true;

        assert_eq!(execute_set(args, &manager, &quiet()), ExitCode::Success);
        assert_eq!(manager.resolve(None).unwrap().name, "local");

        let remove = RemoveArgs {
            name: "local".into(),
        };
        assert_eq!(execute_remove(remove, &manager, &quiet()), ExitCode::Success);
        let remove = RemoveArgs {
            name: "local".into(),
        };
        assert_eq!(execute_remove(remove, &manager, &quiet()), ExitCode::NotFound);
    }

    #[test]
    fn test_set_rejects_plain_http_remote_endpoint() {
        let (manager, _dir) = temp_manager();
        let mut args = set_args("remote");
        args.endpoint = "http://s3.example.com".into();
        assert_eq!(execute_set(args, &manager, &quiet()), ExitCode::UsageError);
    }

    #[test]
    fn test_alias_info_hides_credentials() {
        let alias = Alias::new("test", "http://localhost:9000", "key", "secret");
        let info = AliasInfo::new(&alias, Some("test"));
        insta::assert_json_snapshot!(info, @r#"
        {
          "name": "test",
          "endpoint": "http://localhost:9000",
          "region": "us-east-1",
          "bucket_lookup": "auto",
          "max_attempts": 4,
          "is_default": true
        }
        "#);
    }
}
