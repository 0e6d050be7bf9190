//! Stand-in for `ffprobe`/`ffmpeg`, built as a harness-less test binary and
//! pointed to via `Config.ffprobe_path`/`ffmpeg_path` in integration tests
//! (same pattern the teacher uses for its own mock ffmpeg executable:
//! `env!("CARGO_BIN_EXE_<name>")` gives the path, behavior is steered
//! entirely through environment variables so no argv-parsing logic is
//! duplicated here).

use std::{env, process, thread, time::Duration};

fn main() {
    if let Ok(ms) = env::var("MOCK_SLEEP_MS") {
        if let Ok(ms) = ms.parse::<u64>() {
            thread::sleep(Duration::from_millis(ms));
        }
    }

    if let Ok(stdout) = env::var("MOCK_STDOUT") {
        print!("{stdout}");
    }
    if let Ok(stderr) = env::var("MOCK_STDERR") {
        eprint!("{stderr}");
    }

    let code: i32 = env::var("MOCK_EXIT_CODE").ok().and_then(|v| v.parse().ok()).unwrap_or(0);
    process::exit(code);
}
