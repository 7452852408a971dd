//! POSIX shell quoting for rendering command lines.
//!
//! The executor never hands arguments to a shell; they go to the child as
//! separate argv entries. Quoting is applied per argument so the recorded
//! `command_line` can be pasted into a shell and mean the same thing.

use std::borrow::Cow;

fn is_shell_safe(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '@' | '%' | '+' | '=' | ':' | ',' | '.' | '/' | '-')
}

/// Quote one argument for a POSIX shell
pub fn escape_arg(arg: &str) -> Cow<'_, str> {
    if !arg.is_empty() && arg.chars().all(is_shell_safe) {
        return Cow::Borrowed(arg);
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('\'');
    for c in arg.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    Cow::Owned(quoted)
}

/// Render `program args...` with every argument quoted individually
pub fn render_command_line<S: AsRef<str>>(program: &str, args: &[S]) -> String {
    let mut line = escape_arg(program).into_owned();
    for arg in args {
        line.push(' ');
        line.push_str(&escape_arg(arg.as_ref()));
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_arguments_are_untouched() {
        assert_eq!(escape_arg("example.com"), "example.com");
        assert_eq!(escape_arg("-c"), "-c");
        assert_eq!(escape_arg("8.8.8.8"), "8.8.8.8");
    }

    #[test]
    fn test_metacharacters_are_quoted() {
        assert_eq!(escape_arg("a;rm -rf /"), "'a;rm -rf /'");
        assert_eq!(escape_arg("$(id)"), "'$(id)'");
        assert_eq!(escape_arg("`id`"), "'`id`'");
        assert_eq!(escape_arg("a|b"), "'a|b'");
        assert_eq!(escape_arg(""), "''");
    }

    #[test]
    fn test_single_quotes_are_escaped() {
        assert_eq!(escape_arg("it's"), "'it'\\''s'");
    }

    #[test]
    fn test_render_command_line() {
        let line = render_command_line("dig", &["+short", "example.com; id", "A"]);
        assert_eq!(line, "dig +short 'example.com; id' A");
    }
}
