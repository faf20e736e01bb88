use chrono::TimeZone;
use serde_json::json;

use super::*;
use crate::embed::tests::{strong_ref, QUOTED_CID, QUOTED_URI};
use crate::lexicon::{link_facet, post_from_unknown, Unknown};
use crate::pds::test::MockPds;
use crate::pds::XrpcError;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn at() -> Canonical {
    Canonical::new("did:plc:alice".parse().unwrap(), "3kabc".parse().unwrap())
}

fn old() -> PostRecord {
    let value: Unknown = serde_json::from_value(json!({
        "$type": "app.bsky.feed.post",
        "text": "helo [wrold]",
        "createdAt": "2024-01-01T00:00:00.000Z",
        "langs": ["en"],
        "embed": {
            "$type": "app.bsky.embed.record",
            "record": { "uri": QUOTED_URI, "cid": QUOTED_CID }
        }
    }))
    .unwrap();
    post_from_unknown(&value).unwrap()
}

fn rich() -> RichText {
    RichText {
        text: "hello world".into(),
        facets: vec![link_facet(6, 11, "https://world.example")],
    }
}

#[test]
fn timestamps_have_microsecond_precision() {
    assert_eq!(timestamp(now()).as_str(), "2024-05-01T12:00:00.000000Z");
}

#[test]
fn keep_preserves_the_embed() {
    let record = rebuild(old(), rich(), EmbedChange::Keep, now());
    assert_eq!(record.text, "hello world");
    assert_eq!(record.facets, Some(rich().facets));
    assert_eq!(
        record.embed.clone().map(Stored::lift),
        Some(Node::Quote(strong_ref()))
    );
    assert_eq!(record.created_at.as_str(), "2024-05-01T12:00:00.000000Z");
    assert_eq!(record.langs.as_ref().map(Vec::len), Some(1));
}

#[test]
fn clear_omits_the_embed() -> Result<(), serde_json::Error> {
    let record = rebuild(old(), rich(), EmbedChange::Clear, now());
    assert_eq!(record.embed, None);
    let value = serde_json::to_value(&record)?;
    assert!(value.get("embed").is_none());
    assert_eq!(value["langs"], json!(["en"]));
    Ok(())
}

#[test]
fn text_without_facets_drops_the_old_ones() -> Result<(), serde_json::Error> {
    let faceted = rebuild(old(), rich(), EmbedChange::Keep, now());
    let plain = RichText {
        text: "plain".into(),
        facets: Vec::new(),
    };
    let record = rebuild(faceted, plain, EmbedChange::Keep, now());
    assert_eq!(record.facets, None);
    assert!(serde_json::to_value(&record)?.get("facets").is_none());
    Ok(())
}

#[test]
fn replace_sets_the_embed() -> Result<(), serde_json::Error> {
    let video = json!({
        "$type": "app.bsky.embed.video",
        "video": {
            "$type": "blob",
            "ref": { "$link": "bafkreiamvmojmf2aj6xswjhcehqytssziwat4fgt65tdiwyjzij3xyup7q" },
            "mimeType": "video/mp4",
            "size": 99
        }
    });
    let node: Node<Stored> = serde_json::from_value(video.clone())?;
    let record = rebuild(old(), rich(), EmbedChange::Replace(node), now());
    assert_eq!(serde_json::to_value(&record.embed)?, video);
    Ok(())
}

#[test]
fn batch_deletes_then_creates_under_the_same_key() -> anyhow::Result<()> {
    let record = rebuild(old(), rich(), EmbedChange::Clear, now());
    let batch = Batch::swap(&at(), record)?;

    assert_eq!(batch.writes().len(), 2);
    assert_eq!(
        serde_json::to_value(batch.input())?,
        json!({
            "repo": "did:plc:alice",
            "writes": [
                {
                    "$type": "com.atproto.repo.applyWrites#delete",
                    "collection": "app.bsky.feed.post",
                    "rkey": "3kabc"
                },
                {
                    "$type": "com.atproto.repo.applyWrites#create",
                    "collection": "app.bsky.feed.post",
                    "rkey": "3kabc",
                    "value": {
                        "$type": "app.bsky.feed.post",
                        "text": "hello world",
                        "facets": [{
                            "index": { "byteStart": 6, "byteEnd": 11 },
                            "features": [{
                                "$type": "app.bsky.richtext.facet#link",
                                "uri": "https://world.example"
                            }]
                        }],
                        "createdAt": "2024-05-01T12:00:00.000000Z",
                        "langs": ["en"]
                    }
                }
            ]
        })
    );
    Ok(())
}

#[tokio::test]
async fn execute_issues_one_call() -> Result<(), Error> {
    let pds = MockPds::new();
    let batch = Batch::swap(&at(), old())?;
    execute(&pds, &batch).await?;
    assert_eq!(pds.batches().len(), 1);
    Ok(())
}

#[tokio::test]
async fn rejected_batch_is_a_swap_failure() -> Result<(), Error> {
    let pds = MockPds::new().rejecting_writes();
    let batch = Batch::swap(&at(), old())?;
    let err = execute(&pds, &batch).await.unwrap_err();
    assert!(matches!(err, Error::SwapFailed(_)));
    assert!(!err.is_retryable());
    assert_eq!(pds.batches().len(), 1);
    Ok(())
}

#[tokio::test]
async fn revoked_session_fails_the_swap_once() -> Result<(), Error> {
    let pds = MockPds::new().rejecting_auth();
    let batch = Batch::swap(&at(), old())?;
    let err = execute(&pds, &batch).await.unwrap_err();
    assert!(
        matches!(err, Error::SwapFailed(XrpcError::AuthRequired)),
        "{err:?}"
    );
    assert_eq!(pds.batches().len(), 1);
    Ok(())
}
