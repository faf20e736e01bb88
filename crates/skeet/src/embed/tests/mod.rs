use super::*;
use std::num::NonZeroU64;

use atrium_api::com::atproto::repo::strong_ref;
use atrium_api::types::{Blob, CidLink, TypedBlobRef};
use serde_json::json;

use crate::lexicon::{blob_cid, defs, BlobRef};

pub(crate) const IMAGE_CIDS: [&str; 5] = [
    "bafkreif52kk2zomftal3twsuiuso2njfuzhwdp263mln5mgcrnvompjxrm",
    "bafkreibsocfkgpqtzodacz4oh77g6uragxhdyc4cpdseakm6oky47xgqxe",
    "bafkreid4qj4f7eijabcvmnc66k4av5maqe3xero5fmruyhzb2ccyseipvi",
    "bafkreigdujel5bdorptxv6ggvpzkbml4xt64wcwfph5ktarlh6jbzvo3ri",
    "bafkreignz3yoiqii2dtz7dwn5mkigedtzxmxqeyzxzdhvg7ccg6fsewvku",
];
pub(crate) const QUOTED_URI: &str = "at://did:plc:bob/app.bsky.feed.post/3kquoted";
pub(crate) const QUOTED_CID: &str = "bafyreiftuk6uodfsyt4z4jbb3h5hsouj6g2tpnvcir4bbrbrwwqe4favfe";
const LEGACY_CID: &str = "bafkreiget7vhijp2p6djtcl2s7avtrtjajt5sab3w6gfh6x2r7avyms5qq";
const CAT_CID: &str = "bafkreidxv53ywunl2sr4khc53wlsasu4hltbj26mw5nga3b3nbs25vtujy";
const VIDEO_CID: &str = "bafkreiamvmojmf2aj6xswjhcehqytssziwat4fgt65tdiwyjzij3xyup7q";

/// The blob of fixture image `n`, counted from 1.
pub(crate) fn blob(n: usize) -> BlobRef {
    BlobRef::Typed(TypedBlobRef::Blob(Blob {
        r#ref: CidLink::try_from(IMAGE_CIDS[n - 1]).unwrap(),
        mime_type: "image/jpeg".into(),
        size: 1000,
    }))
}

fn aspect_ratio(n: usize) -> defs::AspectRatio {
    defs::AspectRatioData {
        height: NonZeroU64::new(50).unwrap(),
        width: NonZeroU64::new(100 * n as u64).unwrap(),
    }
    .into()
}

pub(crate) fn new_image(n: usize) -> NewImage {
    let local = format!("file:///tmp/{n}.jpg");
    NewImage {
        display: ShownImage {
            view: images::ViewImageData {
                alt: String::new(),
                aspect_ratio: Some(aspect_ratio(n)),
                fullsize: local.clone(),
                thumb: local,
            }
            .into(),
            resized: false,
        },
        record: images::ImageData {
            alt: String::new(),
            aspect_ratio: Some(aspect_ratio(n)),
            image: blob(n),
        }
        .into(),
    }
}

pub(crate) fn preview() -> Union<record::ViewRecordRefs> {
    serde_json::from_value(preview_json()).unwrap()
}

/// The AppView's rendering of the quoted post.
pub(crate) fn preview_json() -> serde_json::Value {
    json!({
        "$type": "app.bsky.embed.record#viewRecord",
        "uri": QUOTED_URI,
        "cid": QUOTED_CID,
        "author": { "did": "did:plc:bob", "handle": "bob.test" },
        "value": {
            "$type": "app.bsky.feed.post",
            "text": "quoted words",
            "createdAt": "2024-01-01T00:00:00.000Z"
        },
        "indexedAt": "2024-01-01T00:00:00.000Z"
    })
}

pub(crate) fn strong_ref() -> StrongRef {
    strong_ref::MainData {
        cid: QUOTED_CID.parse().unwrap(),
        uri: QUOTED_URI.into(),
    }
    .into()
}

fn card() -> (external::ViewExternal, external::External) {
    (
        external::ViewExternalData {
            description: "An example".into(),
            thumb: None,
            title: "Example".into(),
            uri: "https://example.com".into(),
        }
        .into(),
        external::ExternalData {
            description: "An example".into(),
            thumb: None,
            title: "Example".into(),
            uri: "https://example.com".into(),
        }
        .into(),
    )
}

fn quoted() -> Attachments {
    Attachments::new(Some(Node::Quote(preview())), Some(Node::Quote(strong_ref()))).unwrap()
}

fn with_card() -> Attachments {
    let (d, r) = card();
    Attachments::new(Some(Node::External(d)), Some(Node::External(r))).unwrap()
}

fn layouts(a: &Attachments) -> (Option<Layout>, Option<Layout>) {
    (
        a.display().map(Node::layout),
        a.record().map(Node::layout),
    )
}

#[test]
fn first_image_creates_a_set() -> Result<(), EmbedError> {
    let mut a = Attachments::default();
    a.add_image(new_image(1))?;
    assert_eq!(
        layouts(&a),
        (Some(Layout::Images(1)), Some(Layout::Images(1)))
    );
    assert_eq!(a.record().unwrap().images()[0].image, blob(1));
    Ok(())
}

#[test]
fn fifth_image_is_refused_without_change() -> Result<(), EmbedError> {
    let mut a = Attachments::default();
    for n in 1..=4 {
        a.add_image(new_image(n))?;
    }
    let before = a.clone();

    let err = a.add_image(new_image(5)).unwrap_err();
    assert_eq!(err, EmbedError::AttachmentLimitExceeded { max: MAX_IMAGES });
    assert_eq!(a, before);
    assert_eq!(a.remaining(), 0);
    Ok(())
}

#[test]
fn limit_counts_images_beside_a_quote() -> Result<(), EmbedError> {
    let mut a = quoted();
    for n in 1..=4 {
        a.add_image(new_image(n))?;
    }
    assert_eq!(
        a.add_image(new_image(5)),
        Err(EmbedError::AttachmentLimitExceeded { max: MAX_IMAGES })
    );
    assert_eq!(a.layout(), Some(Layout::QuoteWithImages(4)));
    Ok(())
}

#[test]
fn image_on_a_quote_keeps_the_quote() -> Result<(), EmbedError> {
    let mut a = quoted();
    a.add_image(new_image(1))?;

    assert_eq!(
        layouts(&a),
        (
            Some(Layout::QuoteWithImages(1)),
            Some(Layout::QuoteWithImages(1))
        )
    );
    assert_eq!(a.record().and_then(Node::quote), Some(&strong_ref()));
    assert_eq!(a.display().and_then(Node::quote), Some(&preview()));
    Ok(())
}

#[test]
fn image_replaces_an_external_card() -> Result<(), EmbedError> {
    let mut a = with_card();
    a.add_image(new_image(1))?;
    assert_eq!(
        layouts(&a),
        (Some(Layout::Images(1)), Some(Layout::Images(1)))
    );
    assert!(a.record().and_then(Node::external).is_none());
    Ok(())
}

#[test]
fn image_replaces_a_card_beside_a_quote() -> Result<(), EmbedError> {
    let (d, r) = card();
    let mut a = Attachments::new(
        Some(Node::QuoteWithMedia {
            quote: preview(),
            media: Media::External(d),
        }),
        Some(Node::QuoteWithMedia {
            quote: strong_ref(),
            media: Media::External(r),
        }),
    )?;
    a.add_image(new_image(1))?;
    assert_eq!(a.layout(), Some(Layout::QuoteWithImages(1)));
    assert_eq!(a.record().and_then(Node::quote), Some(&strong_ref()));
    Ok(())
}

#[test]
fn removing_last_image_collapses_to_the_quote() -> Result<(), EmbedError> {
    let original = quoted();
    let mut a = original.clone();
    a.add_image(new_image(1))?;
    a.remove_image(0)?;

    assert_eq!(a, original);
    assert_eq!(a.display(), Some(&Node::Quote(preview())));
    assert_eq!(a.record(), Some(&Node::Quote(strong_ref())));
    Ok(())
}

#[test]
fn removing_last_bare_image_empties() -> Result<(), EmbedError> {
    let mut a = Attachments::default();
    a.add_image(new_image(1))?;
    a.remove_image(0)?;
    assert!(a.is_empty());
    assert!(a.display().is_none());
    assert_eq!(a.into_change(), EmbedChange::Clear);
    Ok(())
}

#[test]
fn removal_keeps_order() -> Result<(), EmbedError> {
    let mut a = Attachments::default();
    for n in 1..=3 {
        a.add_image(new_image(n))?;
    }
    a.remove_image(1)?;

    let cids: Vec<_> = a
        .record()
        .unwrap()
        .images()
        .iter()
        .map(|i| blob_cid(&i.image))
        .collect();
    assert_eq!(cids, [IMAGE_CIDS[0], IMAGE_CIDS[2]]);
    let thumbs: Vec<_> = a
        .display()
        .unwrap()
        .images()
        .iter()
        .map(|i| i.view.thumb.as_str())
        .collect();
    assert_eq!(thumbs, ["file:///tmp/1.jpg", "file:///tmp/3.jpg"]);
    Ok(())
}

#[test]
fn out_of_range_removal() {
    let mut a = quoted();
    assert_eq!(
        a.remove_image(0),
        Err(EmbedError::NoSuchImage { index: 0, count: 0 })
    );
    assert_eq!(a, quoted());
}

#[test]
fn removing_quote_leaves_media() -> Result<(), EmbedError> {
    let mut a = quoted();
    a.add_image(new_image(1))?;
    a.add_image(new_image(2))?;
    a.remove_quote();
    assert_eq!(
        layouts(&a),
        (Some(Layout::Images(2)), Some(Layout::Images(2)))
    );

    let mut bare = quoted();
    bare.remove_quote();
    assert!(bare.is_empty());
    Ok(())
}

#[test]
fn removing_quote_from_images_is_a_no_op() -> Result<(), EmbedError> {
    let mut a = Attachments::default();
    a.add_image(new_image(1))?;
    let before = a.clone();
    a.remove_quote();
    assert_eq!(a, before);
    Ok(())
}

#[test]
fn removing_external_leaves_quote() -> Result<(), EmbedError> {
    let (d, r) = card();
    let mut a = Attachments::new(
        Some(Node::QuoteWithMedia {
            quote: preview(),
            media: Media::External(d),
        }),
        Some(Node::QuoteWithMedia {
            quote: strong_ref(),
            media: Media::External(r),
        }),
    )?;
    a.remove_external();
    assert_eq!(a, quoted());

    let mut bare = with_card();
    bare.remove_external();
    assert!(bare.is_empty());
    Ok(())
}

#[test]
fn mismatched_trees_are_refused() {
    let err = Attachments::new(Some(Node::Quote(preview())), None).unwrap_err();
    assert_eq!(
        err,
        EmbedError::Inconsistent {
            display: Some(Layout::Quote),
            record: None
        }
    );
}

#[test]
fn server_payloads_lift_into_matching_trees() -> Result<(), anyhow::Error> {
    let record: Node<Stored> = serde_json::from_value(json!({
        "$type": "app.bsky.embed.recordWithMedia",
        "record": {
            "$type": "app.bsky.embed.record",
            "record": { "uri": QUOTED_URI, "cid": QUOTED_CID }
        },
        "media": {
            "$type": "app.bsky.embed.images",
            "images": [{
                "alt": "a cat",
                "image": {
                    "$type": "blob",
                    "ref": { "$link": CAT_CID },
                    "mimeType": "image/png",
                    "size": 42
                },
                "aspectRatio": { "width": 4, "height": 3 }
            }]
        }
    }))?;
    let display: Node<Display> = serde_json::from_value(json!({
        "$type": "app.bsky.embed.recordWithMedia#view",
        "record": {
            "$type": "app.bsky.embed.record#view",
            "record": preview_json()
        },
        "media": {
            "$type": "app.bsky.embed.images#view",
            "images": [{
                "thumb": "https://cdn.example/thumb/cat",
                "fullsize": "https://cdn.example/full/cat",
                "alt": "a cat"
            }]
        }
    }))?;

    let mut a = Attachments::new(Some(display), Some(record))?;
    assert_eq!(a.layout(), Some(Layout::QuoteWithImages(1)));
    let quote = a.display().and_then(Node::quote);
    assert_eq!(quote.and_then(quote_uri), Some(QUOTED_URI));
    assert_eq!(quote.and_then(quote_text).as_deref(), Some("quoted words"));

    a.remove_image(0)?;
    assert_eq!(a.record(), Some(&Node::Quote(strong_ref())));
    Ok(())
}

#[test]
fn legacy_blobs_pair_with_their_view() -> Result<(), anyhow::Error> {
    let record: Node<Stored> = serde_json::from_value(json!({
        "$type": "app.bsky.embed.images",
        "images": [{
            "alt": "from an old client",
            "image": { "cid": LEGACY_CID, "mimeType": "image/jpeg" }
        }]
    }))?;
    let display: Node<Display> = serde_json::from_value(json!({
        "$type": "app.bsky.embed.images#view",
        "images": [{
            "thumb": "https://cdn.example/thumb/old",
            "fullsize": "https://cdn.example/full/old",
            "alt": "from an old client"
        }]
    }))?;
    assert_eq!(record.layout(), Layout::Images(1));

    let mut a = Attachments::new(Some(display), Some(record))?;
    a.add_image(new_image(1))?;
    let kept = &a.record().unwrap().images()[0].image;
    assert!(matches!(kept, BlobRef::Untyped(_)));
    assert_eq!(blob_cid(kept), LEGACY_CID);
    assert_eq!(a.layout(), Some(Layout::Images(2)));
    Ok(())
}

#[test]
fn foreign_embeds_pass_through() -> Result<(), serde_json::Error> {
    let video = json!({
        "$type": "app.bsky.embed.video",
        "video": {
            "$type": "blob",
            "ref": { "$link": VIDEO_CID },
            "mimeType": "video/mp4",
            "size": 99
        }
    });
    let node: Node<Stored> = serde_json::from_value(video.clone())?;
    assert_eq!(node.layout(), Layout::Foreign);
    assert_eq!(serde_json::to_value(&node)?, video);

    let unheard_of = json!({ "$type": "app.bsky.embed.hologram", "depth": "shallow" });
    let node: Node<Stored> = serde_json::from_value(unheard_of.clone())?;
    assert_eq!(node.layout(), Layout::Foreign);
    assert_eq!(serde_json::to_value(&node)?, unheard_of);
    Ok(())
}

#[test]
fn image_replaces_a_foreign_embed() -> Result<(), anyhow::Error> {
    let display: Node<Display> = serde_json::from_value(json!({
        "$type": "app.bsky.embed.video#view",
        "playlist": "https://video.example/clip.m3u8"
    }))?;
    let record: Node<Stored> = serde_json::from_value(json!({
        "$type": "app.bsky.embed.video",
        "video": { "cid": VIDEO_CID, "mimeType": "video/mp4" }
    }))?;
    let mut a = Attachments::new(Some(display), Some(record))?;
    assert_eq!(a.layout(), Some(Layout::Foreign));
    a.add_image(new_image(1))?;
    assert_eq!(a.layout(), Some(Layout::Images(1)));
    Ok(())
}

#[test]
fn quote_with_image_record_form() -> Result<(), EmbedError> {
    let mut a = quoted();
    a.add_image(new_image(1))?;
    insta::assert_json_snapshot!(a.record(), @r#"
    {
      "$type": "app.bsky.embed.recordWithMedia",
      "media": {
        "$type": "app.bsky.embed.images",
        "images": [
          {
            "alt": "",
            "aspectRatio": {
              "height": 50,
              "width": 100
            },
            "image": {
              "$type": "blob",
              "ref": {
                "$link": "bafkreif52kk2zomftal3twsuiuso2njfuzhwdp263mln5mgcrnvompjxrm"
              },
              "mimeType": "image/jpeg",
              "size": 1000
            }
          }
        ]
      },
      "record": {
        "record": {
          "cid": "bafyreiftuk6uodfsyt4z4jbb3h5hsouj6g2tpnvcir4bbrbrwwqe4favfe",
          "uri": "at://did:plc:bob/app.bsky.feed.post/3kquoted"
        }
      }
    }
    "#);
    Ok(())
}
