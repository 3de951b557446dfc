//! Wire vocabulary of the shelf protocol.
//!
//! # Exchange summary
//!
//! ```text
//! Handshake      S: hello      C: start      S: ok
//! List / tree    C: List <dir> S: Start      C: OK      S: FileCnt : <n> --name size ...
//! GET (found)    C: GET f d    S: Start      S: <payload>            C: <ack>
//! GET (missing)  C: GET f d    S: FileUnknown                        C: <ack>
//! HIDE / REVEAL  C: HIDE f d   S: OK | FileUnknown
//! GOTO           C: GOTO t d   S: back | Start | NO! | NotFound
//! Terminate      C: Terminate  S: <status>*  S: Terminaison finie, le serveur s'éteint
//! end            C: end        S: ok
//! ```
//!
//! Sub-modules hold the structured payloads carried inside single messages.

pub mod file;
pub mod listing;

pub use file::{decode_payload, encode_payload};
pub use listing::{Listing, ListingEntry};

use crate::message::Role;

// ── Handshake ────────────────────────────────────────────────────

/// First message of every session, server → client.
pub const HELLO: &str = "hello";
/// Client acknowledgement of [`HELLO`].
pub const START: &str = "start";
/// Server acknowledgement of `start` and of `end`.
pub const OK_LOWER: &str = "ok";

// ── Transfers ────────────────────────────────────────────────────

/// "Listing / transfer follows", also the positive GOTO outcome.
pub const TRANSFER_START: &str = "Start";
/// Ready-to-receive acknowledgement, also the HIDE/REVEAL success reply.
pub const OK: &str = "OK";
/// Requested entry does not exist.
pub const FILE_UNKNOWN: &str = "FileUnknown";

// ── Navigation ───────────────────────────────────────────────────

/// GOTO `..`: the client computes the parent locally.
pub const GOTO_BACK: &str = "back";
/// GOTO to the directory the client is already in.
pub const GOTO_ALREADY_THERE: &str = "NO!";
/// GOTO to a target that is neither `..`, a subdirectory, nor the current directory.
pub const GOTO_NOT_FOUND: &str = "NotFound";

// ── Diagnostics / shutdown ───────────────────────────────────────

pub const UNKNOWN_COMMAND: &str =
    "Commande inconnue. Veuillez entrer HELP pour avoir la liste de commande.";
pub const SERVER_TERMINATING: &str = "Server terminating, connection closing.";
pub const SHUTDOWN_COMPLETE: &str = "Terminaison finie, le serveur s'éteint";
pub const SHUTDOWN_FORCED: &str = "Délai de terminaison dépassé, arrêt forcé";

/// Drain progress line sent to the control peer that requested shutdown.
pub fn drain_status(operations: usize, clients: usize) -> String {
    format!("Opérations en cours : {operations}, Clients actifs : {clients}. Attente...")
}

/// Static capability list for a session role.
pub fn help_text(role: Role) -> &'static str {
    match role {
        Role::Normal => "Commandes disponibles : LIST, GET <filename>, TREE, GOTO <dir>, HELP, END",
        Role::Control => {
            "Commandes disponibles : LIST, HIDE <filename>, REVEAL <filename>, TREE, GOTO <dir>, HELP, END et TERMINATE"
        }
    }
}

/// `true` for the last message a terminating control peer will receive.
pub fn is_final_shutdown_notice(message: &str) -> bool {
    matches!(message, SHUTDOWN_COMPLETE | SHUTDOWN_FORCED)
}
