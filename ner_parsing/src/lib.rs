//! Parsing of BIO label sequences.
//!
//! This crate goes back and forth between the three representations of named entities used by
//! `nereval`:
//!
//! * mentions: the surface strings of the entities, grouped by type ([`MentionMap`]), decoded with
//!   [`extract_mentions`];
//! * label sequences: one BIO label per whitespace token, rebuilt from mentions with [`retag`];
//! * chunks: typed positions in a label sequence ([`Entities`]), computed the way SeqEval does with
//!   [`get_entities_lenient`].
mod chunks;
mod decode;
mod mentions;
mod retag;

pub use chunks::{
    get_entities_lenient, Entities, Entity, ParsingError, UserPrefix, NO_TYPE,
};
pub use decode::{extract_mentions, BioLabel};
pub use mentions::MentionMap;
pub use retag::{retag, OUTSIDE};
