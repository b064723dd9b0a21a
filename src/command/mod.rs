// ============================================================================
// Persistence Commands
// ============================================================================
//
// Turns dirty, new and deleted root objects into insert/update/delete
// requests against a `DataStore`. Aggregated objects never get commands of
// their own; the writer folds them into their root's record.
//
// ============================================================================

#[allow(clippy::module_inception)]
pub mod command;
pub mod encryption;
pub mod reader;
pub mod state;
pub mod writer;

pub use command::{
    CommandContext, CommandOutcome, PersistenceCommand, WriteMode, create_create_object_command,
    create_destroy_object_command, create_save_object_command, create_write_object_command,
};
pub use encryption::{
    DataEncryption, KEYED_ENCRYPTION, KeyedEncryption, NO_ENCRYPTION, NoEncryption,
    encryption_for, is_known_encryption,
};
pub use reader::ObjectReader;
pub use state::{ObjectData, StateReader, StateWriter};
pub use writer::ObjectWriter;
