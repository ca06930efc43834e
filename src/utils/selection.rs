use std::{
    io::{Write, stdin, stdout},
    path::{Path, PathBuf},
};

use anyhow::{Result, anyhow};
use crossterm::{
    QueueableCommand,
    style::{Color, ResetColor, SetForegroundColor},
};

use crate::error::ScraperError;
use crate::utils::file::ChannelFolder;

/// Prints `question` in the prompt color and returns the trimmed answer.
pub fn prompt(question: &str) -> Result<String> {
    let mut out = stdout();
    out.queue(SetForegroundColor(Color::Cyan))?;
    print!("{question}");
    out.queue(ResetColor)?;
    out.flush()?;

    let mut input = String::new();
    stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Yes/no question; an empty answer takes `default`.
pub fn confirm(question: &str, default: bool) -> Result<bool> {
    let answer = prompt(question)?;
    Ok(parse_yes_no(&answer, default))
}

pub fn parse_yes_no(answer: &str, default: bool) -> bool {
    match answer.trim().to_lowercase().as_str() {
        "" => default,
        "y" | "yes" => true,
        _ => false,
    }
}

/// 1-based menu pick into a list of `len` entries.
pub fn parse_choice(input: &str, len: usize) -> Option<usize> {
    match input.trim().parse::<usize>() {
        Ok(n) if (1..=len).contains(&n) => Some(n - 1),
        _ => None,
    }
}

/// Resolves the channel folder to work on: the explicit one if given,
/// otherwise a folder under `root` holding `marker`, asking when there are
/// several.
pub fn select_folder(root: &Path, marker: &'static str, explicit: Option<PathBuf>) -> Result<ChannelFolder> {
    if let Some(path) = explicit {
        return Ok(ChannelFolder::new(path));
    }

    let mut folders = ChannelFolder::discover(root, marker)?;
    if folders.is_empty() {
        return Err(ScraperError::NoChannelFolder { root: root.to_path_buf(), marker }.into());
    }

    println!("Available channels:");
    for (i, folder) in folders.iter().enumerate() {
        println!("{}. {}", i + 1, folder.name());
    }

    if folders.len() == 1 {
        let folder = folders.remove(0);
        println!("\nUsing channel: {}", folder.name());
        return Ok(folder);
    }

    let choice = prompt("\nSelect channel number: ")?;
    let index = parse_choice(&choice, folders.len()).ok_or_else(|| anyhow!("Invalid choice."))?;
    Ok(folders.swap_remove(index))
}
