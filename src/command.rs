use thiserror::Error;

use crate::resolver::FolderPath;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List {
        folder: FolderPath,
    },
    Delete {
        folder: FolderPath,
        file: String,
    },
    Move {
        source: String,
        source_folder: FolderPath,
        file: String,
        destination: FolderPath,
    },
    Rename {
        folder: FolderPath,
        old_name: String,
        new_name: String,
    },
    Upload {
        file_name: String,
        destination: FolderPath,
    },
    Summary {
        folder: FolderPath,
    },
    Help,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    #[error("Invalid DELETE command. Use: DELETE /Folder/file.pdf")]
    Delete,
    #[error("Invalid MOVE command. Use: MOVE /Folder/file.pdf /Archive")]
    Move,
    #[error("Invalid RENAME command. Use: RENAME /Folder oldfile.pdf newfile.pdf")]
    Rename,
    #[error("Invalid UPLOAD command. Send file with message: UPLOAD filename.pdf to /Folder")]
    Upload,
}

pub const HELP_TEXT: &str = "🤖 *WhatsApp Google Drive Assistant*

Available commands:

📋 *LIST /FolderName*
   Lists all files in the specified folder

🗑️ *DELETE /Folder/file.pdf*
   Deletes the specified file

📦 *MOVE /Folder/file.pdf /Archive*
   Moves file to another folder

✏️ *RENAME /Folder oldfile.pdf newfile.pdf*
   Renames a file

📤 *UPLOAD filename.pdf to /Folder*
   Upload attached file (send with file attachment)

📝 *SUMMARY /FolderName*
   Generates AI summaries of documents in folder

❓ *HELP*
   Shows this help message

Wrap names containing spaces in double quotes, e.g. RENAME \"/My Docs\" \"old name.txt\" new.txt";

/// Parses a message body. `Ok(None)` means the text is not a command and
/// should be ignored.
pub fn parse(text: &str) -> Result<Option<Command>, UsageError> {
    let text = text.trim();

    if let Some(rest) = text.strip_prefix("LIST ") {
        return Ok(Some(Command::List {
            folder: FolderPath::parse(rest.trim()),
        }));
    }
    if let Some(rest) = text.strip_prefix("DELETE ") {
        let (folder, file) = split_file_path(rest.trim()).ok_or(UsageError::Delete)?;
        return Ok(Some(Command::Delete { folder, file }));
    }
    if let Some(rest) = text.strip_prefix("MOVE ") {
        return parse_move(rest).map(Some);
    }
    if let Some(rest) = text.strip_prefix("RENAME ") {
        let args = tokenize(rest).ok_or(UsageError::Rename)?;
        let [folder, old_name, new_name]: [String; 3] =
            args.try_into().map_err(|_| UsageError::Rename)?;
        return Ok(Some(Command::Rename {
            folder: FolderPath::parse(&folder),
            old_name,
            new_name,
        }));
    }
    if let Some(rest) = text.strip_prefix("SUMMARY ") {
        return Ok(Some(Command::Summary {
            folder: FolderPath::parse(rest.trim()),
        }));
    }
    if let Some(rest) = text.strip_prefix("UPLOAD ") {
        let parts: Vec<&str> = rest.split(" to ").collect();
        if parts.len() != 2 {
            return Err(UsageError::Upload);
        }
        return Ok(Some(Command::Upload {
            file_name: parts[0].trim().to_string(),
            destination: FolderPath::parse(parts[1].trim()),
        }));
    }
    if text.eq_ignore_ascii_case("help") {
        return Ok(Some(Command::Help));
    }

    Ok(None)
}

fn parse_move(rest: &str) -> Result<Command, UsageError> {
    let args = tokenize(rest).ok_or(UsageError::Move)?;
    let [source, destination]: [String; 2] = args.try_into().map_err(|_| UsageError::Move)?;
    let (source_folder, file) = split_file_path(&source).ok_or(UsageError::Move)?;
    Ok(Command::Move {
        source,
        source_folder,
        file,
        destination: FolderPath::parse(&destination),
    })
}

fn split_file_path(path: &str) -> Option<(FolderPath, String)> {
    let (folder, file) = match path.rfind('/') {
        Some(idx) => (&path[..idx], &path[idx + 1..]),
        None => ("", path),
    };
    if file.is_empty() {
        return None;
    }
    Some((FolderPath::parse(folder), file.to_string()))
}

// Double quotes group a token that contains spaces
fn tokenize(input: &str) -> Option<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in input.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }

    if in_quotes {
        return None;
    }
    if has_token {
        tokens.push(current);
    }
    Some(tokens)
}
