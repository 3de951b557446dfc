//! One-shot command execution.
//!
//! An [`Action`] is run over a freshly handshaken [`Client`] and turned
//! into printable lines. The session is closed with `end` afterwards,
//! except after `Terminate`, where the server closes it.

use shelf_core::{Client, GotoOutcome, Listing, ListingEntry, ShelfError};

/// What to do once connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    List { dir: String },
    Tree { dir: String },
    Get { file: String, dir: String },
    Goto { target: String, from: String },
    Hide { file: String, dir: String },
    Reveal { file: String, dir: String },
    Help,
    Terminate,
}

impl Action {
    /// Hide, reveal and terminate only exist on the control endpoint.
    pub fn needs_control(&self) -> bool {
        matches!(
            self,
            Action::Hide { .. } | Action::Reveal { .. } | Action::Terminate
        )
    }
}

/// Run `action` and return the lines to print.
pub async fn execute(mut client: Client, action: &Action) -> Result<Vec<String>, ShelfError> {
    let lines = match action {
        Action::List { dir } => render_listing(&client.list(dir).await?),
        Action::Tree { dir } => render_listing(&client.tree(dir).await?),
        Action::Get { file, dir } => match client.get(file, dir).await? {
            Some(content) => content.lines().map(str::to_string).collect(),
            None => vec![format!("{file}: not found in {dir}")],
        },
        Action::Goto { target, from } => {
            client.set_current_dir(from.clone());
            let line = match client.goto(target).await? {
                GotoOutcome::Entered(path) | GotoOutcome::Back(path) => path,
                GotoOutcome::AlreadyThere => format!("already in {from}"),
                GotoOutcome::NotFound => format!("{target}: no such directory in {from}"),
            };
            vec![line]
        }
        Action::Hide { file, dir } => vec![rename_line(client.hide(file, dir).await?, file, "hidden")],
        Action::Reveal { file, dir } => {
            vec![rename_line(client.reveal(file, dir).await?, file, "revealed")]
        }
        Action::Help => vec![client.help().await?],
        Action::Terminate => {
            let report = client.terminate().await?;
            let mut lines = report.status;
            lines.push(report.notice);
            return Ok(lines);
        }
    };

    client.end().await?;
    Ok(lines)
}

fn rename_line(done: bool, file: &str, verb: &str) -> String {
    if done {
        format!("{file}: {verb}")
    } else {
        format!("{file}: not found")
    }
}

/// One line per entry, nested entries indented by two spaces per level.
pub fn render_listing(listing: &Listing) -> Vec<String> {
    let mut lines = vec![format!("{} entries", listing.count())];
    render_entries(&listing.entries, 0, &mut lines);
    lines
}

fn render_entries(entries: &[ListingEntry], depth: usize, out: &mut Vec<String>) {
    for entry in entries {
        let marker = if entry.children.is_some() { "/" } else { "" };
        out.push(format!(
            "{:indent$}{}{marker}  {}",
            "",
            entry.name,
            entry.size,
            indent = depth * 2
        ));
        if let Some(children) = &entry.children {
            render_entries(children, depth + 1, out);
        }
    }
}
