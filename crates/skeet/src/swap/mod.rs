//! # Atomic Swap
//!
//! Posts are immutable at the protocol level, so an edit replaces the record wholesale: one
//! `applyWrites` batch deletes the record and creates its successor under the same record key.
//! The batch either applies completely or not at all, and the post keeps its URI.
#[cfg(test)]
mod tests;

use atrium_api::com::atproto::repo::apply_writes::{self, InputWritesItem};
use atrium_api::types::string::{Datetime, Did};
use chrono::{DateTime, Utc};
use smallvec::{smallvec, SmallVec};

use crate::embed::{Node, Shape, Stored};
use crate::lexicon::{post_into_unknown, PostRecord, PostRecordData};
use crate::pds::Pds;
use crate::reference::Canonical;
use crate::richtext::RichText;
use crate::Error;

/// What to do with the embed of the rebuilt record.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum EmbedChange {
    /// Leave the existing embed as is.
    #[default]
    Keep,
    /// Drop the embed field entirely.
    Clear,
    Replace(Node<Stored>),
}

/// The timestamp a record carries, e.g. `2024-05-01T12:00:00.000000Z`.
pub fn timestamp(at: DateTime<Utc>) -> Datetime {
    Datetime::new(at.fixed_offset())
}

/// Produces the successor of `old`: text, facets and embed are replaced and the creation time
/// is reset to `now`. Every other field is carried over verbatim.
pub fn rebuild(
    old: PostRecord,
    rich: RichText,
    change: EmbedChange,
    now: DateTime<Utc>,
) -> PostRecord {
    let RichText { text, facets } = rich;
    let PostRecord { data, extra_data } = old;
    let embed = match change {
        EmbedChange::Keep => data.embed,
        EmbedChange::Clear => None,
        EmbedChange::Replace(node) => Some(Stored::lower(node)),
    };
    PostRecord {
        data: PostRecordData {
            text,
            facets: (!facets.is_empty()).then_some(facets),
            embed,
            created_at: timestamp(now),
            ..data
        },
        extra_data,
    }
}

/// The writes of a `com.atproto.repo.applyWrites` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    repo: Did,
    writes: SmallVec<[InputWritesItem; 2]>,
}

impl Batch {
    /// Deletes the record at `at`, then recreates it as `record` under the same key.
    pub fn swap(at: &Canonical, record: PostRecord) -> Result<Self, Error> {
        let value = post_into_unknown(record)?;
        let delete = apply_writes::DeleteData {
            collection: at.collection().clone(),
            rkey: at.rkey().clone(),
        };
        let create = apply_writes::CreateData {
            collection: at.collection().clone(),
            rkey: Some(at.rkey().clone()),
            value,
        };
        Ok(Batch {
            repo: at.repo().clone(),
            writes: smallvec![
                InputWritesItem::Delete(Box::new(delete.into())),
                InputWritesItem::Create(Box::new(create.into())),
            ],
        })
    }

    pub fn repo(&self) -> &Did {
        &self.repo
    }

    pub fn writes(&self) -> &[InputWritesItem] {
        &self.writes
    }

    /// The request body.
    pub fn input(&self) -> apply_writes::Input {
        apply_writes::InputData {
            repo: self.repo.clone().into(),
            swap_commit: None,
            validate: None,
            writes: self.writes.to_vec(),
        }
        .into()
    }
}

/// Commits the batch in one call. A failure is never retried.
#[tracing::instrument(skip_all, fields(repo = batch.repo().as_str()))]
pub async fn execute<P>(pds: &P, batch: &Batch) -> Result<(), Error>
where
    P: Pds + ?Sized,
{
    match pds.apply_writes(batch).await {
        Ok(()) => {
            tracing::info!("Swapped post record");
            Ok(())
        }
        Err(e) => {
            let err = Error::SwapFailed(e);
            err.warn();
            Err(err)
        }
    }
}
