//! Typed command contracts.
//!
//! Capabilities never build argument vectors by hand. Each external tool they
//! drive gets a struct implementing [`CommandArgs`], so the flag layout for a
//! tool lives in exactly one place and is covered by unit tests.

/// Mapping from a typed struct to an external program invocation.
///
/// # Contract
///
/// - `program()` is the executable name or path, resolved through `PATH`.
/// - `to_cli_args()` are the arguments in the order the program expects.
/// - `get_env_vars()` are added on top of the inherited environment.
pub trait CommandArgs {
    fn program(&self) -> &str;

    fn to_cli_args(&self) -> Vec<String>;

    fn get_env_vars(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// `program arg1 arg2` for logs and dry-run output
    fn display(&self) -> String {
        std::iter::once(self.program().to_string())
            .chain(self.to_cli_args())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo(Vec<String>);

    impl CommandArgs for Echo {
        fn program(&self) -> &str {
            "echo"
        }

        fn to_cli_args(&self) -> Vec<String> {
            self.0.clone()
        }
    }

    #[test]
    fn test_display_joins_program_and_args() {
        let echo = Echo(vec!["hello".into(), "world".into()]);
        assert_eq!(echo.display(), "echo hello world");
        assert!(echo.get_env_vars().is_empty());
    }
}
