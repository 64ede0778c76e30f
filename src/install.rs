//! Detect the intercepting proxy engine on the host.
use which::which;

/// Executable started by the supervisor (part of the mitmproxy distribution).
pub const ENGINE_BINARY: &str = "mitmdump";

/// Return true when `program` resolves on PATH. Lookup failures of any kind yield false.
pub fn check_installed_program(program: &str) -> bool {
    which(program).is_ok()
}

/// Return true when the default engine binary is available.
pub fn check_installed() -> bool {
    check_installed_program(ENGINE_BINARY)
}

pub fn install_instructions() -> &'static str {
    "mitmproxy is not installed. Please install it:

macOS:
  brew install mitmproxy

Linux (Ubuntu/Debian):
  sudo apt-get install mitmproxy

Linux (Fedora):
  sudo dnf install mitmproxy

Using pip:
  pip install mitmproxy

For more information, visit: https://mitmproxy.org/"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_instructions_cover_platforms() {
        let text = install_instructions();
        assert!(text.contains("mitmproxy"));
        assert!(text.contains("brew install"));
        assert!(text.contains("apt-get install"));
        assert!(text.contains("pip install"));
    }

    #[test]
    fn test_missing_program_is_not_installed() {
        assert!(!check_installed_program(
            "agent-battler-definitely-not-a-real-binary"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_shell_is_installed() {
        assert!(check_installed_program("sh"));
    }
}
