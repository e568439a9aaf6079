//! Binary encoding of a staged component map.
//!
//! Layout: lz4 block (size prepended) wrapping a bincode `StageEnvelope`
//! whose first field is the format revision. Readers check the revision
//! before decoding the rest, so a blob written by an incompatible build is
//! rejected instead of misread.

use bincode::{Decode, Encode};
use lz4_flex::block::{compress_prepend_size, decompress_size_prepended};

use super::Stage;
use crate::error::{AmosError, Result};
use crate::model::{Component, InsertPolicy, LangString};
use crate::version::Version;

/// Bump whenever the envelope or any encoded type changes shape.
pub const STAGE_FORMAT_REVISION: u16 = 1;

#[derive(Debug, Encode, Decode)]
struct StageEnvelope {
    format_revision: u16,
    components: Vec<StoredComponent>,
}

#[derive(Debug, Encode, Decode)]
struct StoredComponent {
    name: String,
    language: String,
    version: Version,
    strings: Vec<LangString>,
}

pub fn encode_stage(stage: &Stage) -> Result<Vec<u8>> {
    let envelope = StageEnvelope {
        format_revision: STAGE_FORMAT_REVISION,
        components: stage
            .components()
            .into_iter()
            .map(|c| StoredComponent {
                name: c.name().to_string(),
                language: c.language().to_string(),
                version: c.version().clone(),
                strings: c.strings().cloned().collect(),
            })
            .collect(),
    };
    let raw = bincode::encode_to_vec(&envelope, bincode::config::standard())
        .map_err(|e| AmosError::Encoding(e.to_string()))?;
    Ok(compress_prepend_size(&raw))
}

pub fn decode_stage(bytes: &[u8]) -> Result<Stage> {
    let raw = decompress_size_prepended(bytes)
        .map_err(|e| AmosError::Encoding(format!("lz4: {e}")))?;
    let (revision, _): (u16, usize) =
        bincode::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|e| AmosError::Encoding(e.to_string()))?;
    if revision != STAGE_FORMAT_REVISION {
        return Err(AmosError::Encoding(format!(
            "stage format revision {revision}, expected {STAGE_FORMAT_REVISION}"
        )));
    }
    let (envelope, _): (StageEnvelope, usize) =
        bincode::decode_from_slice(&raw, bincode::config::standard())
            .map_err(|e| AmosError::Encoding(e.to_string()))?;

    let mut stage = Stage::new();
    for stored in envelope.components {
        let mut component = Component::new(stored.name, stored.language, stored.version);
        for string in stored.strings {
            component.add_string(string, InsertPolicy::Fail)?;
        }
        stage.add(&component, InsertPolicy::Overwrite)?;
    }
    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::version;

    #[test]
    fn stage_survives_encoding() -> Result<()> {
        let mut stage = Stage::new();
        let mut component = Component::new("mod_forum", "cs", version(401));
        component.add_string(LangString::new("post", "Příspěvek", 3), InsertPolicy::Fail)?;
        component.add_string(LangString::tombstone("old", 4), InsertPolicy::Fail)?;
        stage.add(&component, InsertPolicy::Fail)?;

        let decoded = decode_stage(&encode_stage(&stage)?)?;
        assert_eq!(
            decoded.get_component("mod_forum", "cs", &version(401)),
            Some(&component)
        );
        Ok(())
    }

    #[test]
    fn foreign_revision_is_rejected() {
        let envelope = StageEnvelope {
            format_revision: STAGE_FORMAT_REVISION + 1,
            components: Vec::new(),
        };
        let raw = bincode::encode_to_vec(&envelope, bincode::config::standard()).unwrap();
        let err = decode_stage(&compress_prepend_size(&raw)).unwrap_err();
        assert!(matches!(err, AmosError::Encoding(_)));

        assert!(decode_stage(&[4, 0, 0, 0, 0xff]).is_err());
    }
}
