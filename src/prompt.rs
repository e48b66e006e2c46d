//! Interactive prompts for `--adduser`.

use anyhow::{Context, Result, bail};
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    terminal,
};
use std::io::{self, BufRead, IsTerminal, Write};

pub struct NewUser {
    pub username: String,
    pub password: String,
}

/// Ask for a username and a password (twice). The password is masked when
/// stdin is a terminal; piped input is read line by line.
pub fn read_new_user() -> Result<NewUser> {
    let username = read_line("Username: ")?;
    if username.is_empty() {
        bail!("Username cannot be empty.");
    }

    let password = read_password("Password: ")?;
    if password.is_empty() {
        bail!("Password cannot be empty.");
    }
    let confirm = read_password("Confirm password: ")?;
    if password != confirm {
        bail!("Passwords do not match.");
    }

    Ok(NewUser { username, password })
}

fn read_line(prompt: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Cannot read from stdin")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn read_password(prompt: &str) -> Result<String> {
    if !io::stdin().is_terminal() {
        return read_line(prompt);
    }

    let mut stdout = io::stdout();
    write!(stdout, "{prompt}")?;
    stdout.flush()?;

    let _raw = RawMode::enable().context("Cannot switch terminal to raw mode")?;
    let mut password = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => break,
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                write!(stdout, "\r\n")?;
                bail!("Cancelled.");
            }
            KeyCode::Esc => {
                write!(stdout, "\r\n")?;
                bail!("Cancelled.");
            }
            KeyCode::Backspace => {
                if password.pop().is_some() {
                    write!(stdout, "\u{8} \u{8}")?;
                }
            }
            KeyCode::Char(c) => {
                password.push(c);
                write!(stdout, "*")?;
            }
            _ => {}
        }
        stdout.flush()?;
    }
    write!(stdout, "\r\n")?;
    stdout.flush()?;
    Ok(password)
}

/// Restores cooked mode on drop, including on early return.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}
