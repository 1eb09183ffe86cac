//! Interactive y/N confirmation, the idiom the teacher uses for its own
//! destructive-operation guard (`cli.rs`'s config-reset confirmation).
//! Reading from stdin with no terminal attached yields an empty line, which
//! this treats as a decline — a non-interactive invocation with no `--yes`
//! refuses rather than hangs or silently proceeds.

use std::io::Write;

/// Prints `message` to stderr (so stdout stays script-friendly) and reads one
/// line from stdin. Only an explicit `y`/`Y` confirms.
pub fn confirm(message: &str) -> bool {
    eprint!("{message}");
    let _ = std::io::stderr().flush();

    let mut input = String::new();
    if std::io::stdin().read_line(&mut input).is_err() {
        return false;
    }
    input.trim().eq_ignore_ascii_case("y")
}
