// Copyright (C) 2024 Ethan Uppal. All rights reserved.

//! Program images: whitespace-separated decimal words, `#` to end of line
//! is a comment.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use stackvm::arch::Word;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("line {line}: `{token}` is not a word")]
    BadWord { line: usize, token: String },
}

pub fn parse_words(source: &str) -> Result<Vec<Word>, ImageError> {
    let mut words = vec![];
    for (index, line) in source.lines().enumerate() {
        let code = line.split('#').next().unwrap_or_default();
        for token in code.split_whitespace() {
            let word = token.parse::<Word>().map_err(|_| ImageError::BadWord {
                line: index + 1,
                token: token.to_owned(),
            })?;
            words.push(word);
        }
    }
    Ok(words)
}

pub fn load_words(path: &Path) -> Result<Vec<Word>, ImageError> {
    let source = fs::read_to_string(path).map_err(|source| ImageError::Io {
        path: path.to_owned(),
        source,
    })?;
    parse_words(&source)
}

pub fn load_bytes(path: &Path) -> Result<Vec<u8>, ImageError> {
    fs::read(path).map_err(|source| ImageError::Io {
        path: path.to_owned(),
        source,
    })
}
