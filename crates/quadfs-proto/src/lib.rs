//! QuadFS Protocol - Wire format shared by the gateway, storage nodes and clients
//!
//! Every message starts with a one-byte command tag followed by the
//! command's fields. Strings are length-prefixed (`u16`, big-endian) with a
//! per-field limit; sizes are signed 64-bit headers where a negative value
//! is the error sentinel. Payloads follow their size header directly.

pub mod codec;
pub mod command;
pub mod server;
pub mod transfer;

pub use codec::{
    ERROR_SENTINEL, MAX_FILENAME_LEN, MAX_LISTING_ENTRIES, MAX_MERGED_LISTING_ENTRIES,
    MAX_PATH_LEN, MAX_TAG_LEN, read_count, read_listing, read_listing_up_to, read_size,
    read_status, read_string, write_count, write_listing, write_listing_up_to, write_size,
    write_status, write_string,
};
pub use command::{Command, Request};
pub use server::{ConnectionHandler, serve};
pub use transfer::{copy_exact, deadline};
