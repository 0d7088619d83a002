//! Background loading.
//!
//! A parse runs to completion on its own thread and reports exactly one
//! [`LoadResult`] over a channel. Loads share nothing but the parser's
//! immutable registry.

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;

use crate::parsers::Klippy;
use crate::state::{LoadResult, LoadedFile};

/// Start loading a file in the background
pub fn spawn_load(parser: Klippy, path: PathBuf) -> Receiver<LoadResult> {
    let (sender, receiver): (Sender<LoadResult>, Receiver<LoadResult>) = channel();

    thread::spawn(move || {
        let result = load_file_sync(&parser, path);
        let _ = sender.send(result);
    });

    receiver
}

/// Synchronously load a file (runs in background thread)
pub fn load_file_sync(parser: &Klippy, path: PathBuf) -> LoadResult {
    let table = match parser.parse_file(&path) {
        Ok(t) => t,
        Err(e) => return LoadResult::Error(format!("Failed to parse log file: {}", e)),
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    LoadResult::Success(Box::new(LoadedFile { path, name, table }))
}
