// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Command-line and environment validation. A hand-rolled parser rather
//! than a derive-based one: the invocation is two positional slots
//! followed by an open-ended, pass-through command line, which
//! `argh`-style flag parsers aren't built to express.

use std::ffi::OsString;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("usage: supervisor <outDir> <cmd> [args...]")]
    MissingArguments,
    #[error("output directory {0:?} doesn't exist or is not a directory")]
    OutDirInvalid(PathBuf),
    #[error("the required WAITER_EXEC environment variable wasn't provided")]
    MissingWaiterExec,
    #[error("the required WAITER_CONTEXT environment variable wasn't provided")]
    MissingWaiterContext,
}

pub struct Config {
    pub out_dir: PathBuf,
    pub target_argv: Vec<OsString>,
    pub waiter_exec: OsString,
    pub waiter_context: OsString,
    pub capture_disabled: bool,
}

impl Config {
    /// Parses `argv` (as handed to `main`, program name included) plus the
    /// process environment into a validated `Config`.
    pub fn from_env(
        mut argv: impl Iterator<Item = OsString>,
        env: impl Fn(&str) -> Option<OsString>,
    ) -> Result<Config, ConfigError> {
        argv.next(); // argv[0], the supervisor's own path.

        let out_dir = argv.next().ok_or(ConfigError::MissingArguments)?;
        let first_arg = argv.next().ok_or(ConfigError::MissingArguments)?;

        let mut target_argv = Vec::with_capacity(1 + argv.size_hint().0);
        target_argv.push(first_arg);
        target_argv.extend(argv);

        let out_dir = PathBuf::from(out_dir);
        if !out_dir.is_dir() {
            return Err(ConfigError::OutDirInvalid(out_dir));
        }

        let waiter_exec = env("WAITER_EXEC").ok_or(ConfigError::MissingWaiterExec)?;
        let waiter_context = env("WAITER_CONTEXT").ok_or(ConfigError::MissingWaiterContext)?;

        let capture_disabled = env("DISABLE_LOG_CAPTURE")
            .map(|v| v == "1")
            .unwrap_or(false);

        Ok(Config {
            out_dir,
            target_argv,
            waiter_exec,
            waiter_context,
            capture_disabled,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> HashMap<String, OsString> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), OsString::from(v)))
            .collect()
    }

    fn argv(args: &[&str]) -> impl Iterator<Item = OsString> {
        args.iter().map(OsString::from).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn missing_positional_arguments_is_rejected() {
        let env = env_from(&[]);
        let result = Config::from_env(argv(&["supervisor"]), |k| env.get(k).cloned());
        assert!(matches!(result, Err(ConfigError::MissingArguments)));
    }

    #[test]
    fn nonexistent_out_dir_is_rejected() {
        let env = env_from(&[("WAITER_EXEC", "/bin/true"), ("WAITER_CONTEXT", "ctx")]);
        let result = Config::from_env(
            argv(&["supervisor", "/definitely/not/a/real/dir", "echo"]),
            |k| env.get(k).cloned(),
        );
        assert!(matches!(result, Err(ConfigError::OutDirInvalid(_))));
    }

    #[test]
    fn missing_waiter_exec_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_from(&[("WAITER_CONTEXT", "ctx")]);
        let result = Config::from_env(
            argv(&["supervisor", dir.path().to_str().unwrap(), "echo"]),
            |k| env.get(k).cloned(),
        );
        assert!(matches!(result, Err(ConfigError::MissingWaiterExec)));
    }

    #[test]
    fn missing_waiter_context_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_from(&[("WAITER_EXEC", "/bin/true")]);
        let result = Config::from_env(
            argv(&["supervisor", dir.path().to_str().unwrap(), "echo"]),
            |k| env.get(k).cloned(),
        );
        assert!(matches!(result, Err(ConfigError::MissingWaiterContext)));
    }

    #[test]
    fn trailing_argv_is_forwarded_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_from(&[("WAITER_EXEC", "/bin/true"), ("WAITER_CONTEXT", "ctx")]);
        let config = Config::from_env(
            argv(&[
                "supervisor",
                dir.path().to_str().unwrap(),
                "echo",
                "hello",
                "world",
            ]),
            |k| env.get(k).cloned(),
        )
        .unwrap();
        assert_eq!(
            config.target_argv,
            vec![
                OsString::from("echo"),
                OsString::from("hello"),
                OsString::from("world"),
            ]
        );
        assert!(!config.capture_disabled);
    }

    #[test]
    fn disable_log_capture_only_trips_on_exactly_one() {
        let dir = tempfile::tempdir().unwrap();
        let env = env_from(&[
            ("WAITER_EXEC", "/bin/true"),
            ("WAITER_CONTEXT", "ctx"),
            ("DISABLE_LOG_CAPTURE", "1"),
        ]);
        let config = Config::from_env(
            argv(&["supervisor", dir.path().to_str().unwrap(), "echo"]),
            |k| env.get(k).cloned(),
        )
        .unwrap();
        assert!(config.capture_disabled);
    }
}
