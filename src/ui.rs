//! Terminal surfaces - listening indicator, error line, transcript line
//!
//! Plain ANSI one-liners; the driver renders session events onto these.
//! Raw mode is active during the interactive loop, hence the explicit \r\n.

use std::io::Write;

use crate::state::CaptureMode;

fn flush() {
    std::io::stdout().flush().ok();
}

pub fn banner(mode_hint: &str) {
    print!("voxtask voice commands - {}\r\n", mode_hint);
    print!("  space: toggle listening   q / esc: quit\r\n\r\n");
    flush();
}

pub fn mode_line(mode: CaptureMode) {
    print!("\r\x1b[K\x1b[90mcapture: {}\x1b[0m\r\n", mode);
    flush();
}

pub fn notice(msg: &str) {
    print!("\r\x1b[K\x1b[33m{}\x1b[0m\r\n", msg);
    flush();
}

pub fn listening_on() {
    print!("\r\x1b[K\x1b[32m\u{25cf} Listening...\x1b[0m");
    flush();
}

pub fn listening_off() {
    print!("\r\x1b[K");
    flush();
}

pub fn show_interim(text: &str) {
    print!("\r\x1b[K\x1b[90m{}\x1b[0m", text);
    flush();
}

pub fn show_final(text: &str) {
    print!("\r\x1b[K> {}\r\n", text);
    flush();
}

pub fn show_error(msg: &str) {
    print!("\r\x1b[K\x1b[31m{}\x1b[0m\r\n", msg);
    flush();
}

pub fn clear_error() {
    print!("\r\x1b[K");
    flush();
}

pub fn fallback_prompt() {
    print!("\r\x1b[KSpeech capture is unavailable. Type your command and press Enter.\r\n: ");
    flush();
}

pub fn tasks_refreshed() {
    print!("\r\x1b[K\x1b[90m(task list refreshed)\x1b[0m\r\n");
    flush();
}

pub fn echo_char(c: char) {
    print!("{}", c);
    flush();
}

pub fn erase_char() {
    print!("\x08 \x08");
    flush();
}
