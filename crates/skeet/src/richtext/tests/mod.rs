use super::*;
use crate::lexicon::{facet, Union};
use crate::pds::test::{Call, MockPds};
use crate::pds::XrpcError;

fn mention(byte_start: usize, byte_end: usize, did: &str) -> Facet {
    let mention = facet::MentionData {
        did: did.parse().unwrap(),
    };
    facet::MainData {
        features: vec![Union::Refs(facet::MainFeaturesItem::Mention(Box::new(
            mention.into(),
        )))],
        index: facet::ByteSliceData {
            byte_end,
            byte_start,
        }
        .into(),
    }
    .into()
}

fn tag(byte_start: usize, byte_end: usize, tag: &str) -> Facet {
    facet::MainData {
        features: vec![Union::Refs(facet::MainFeaturesItem::Tag(Box::new(
            facet::TagData { tag: tag.into() }.into(),
        )))],
        index: facet::ByteSliceData {
            byte_end,
            byte_start,
        }
        .into(),
    }
    .into()
}

fn spans(facets: &[Facet]) -> Vec<(usize, usize)> {
    facets
        .iter()
        .map(|f| (f.index.byte_start, f.index.byte_end))
        .collect()
}

#[test]
fn markdown_link_becomes_a_facet() {
    let rich = strip_markdown("[hi](http://a.b)");
    assert_eq!(rich.text, "hi");
    assert_eq!(rich.facets, [link_facet(0, 2, "http://a.b")]);
}

#[test]
fn offsets_count_utf8_bytes() {
    let rich = strip_markdown("é[x](y)");
    assert_eq!(rich.text, "éx");
    assert_eq!(spans(&rich.facets), [(2, 3)]);

    let rich = strip_markdown("🦀 [ünï](https://c.d) and [two](https://e.f)!");
    assert_eq!(rich.text, "🦀 ünï and two!");
    let (first, second) = (&rich.facets[0], &rich.facets[1]);
    assert_eq!(
        &rich.text[first.index.byte_start..first.index.byte_end],
        "ünï"
    );
    assert_eq!(
        &rich.text[second.index.byte_start..second.index.byte_end],
        "two"
    );
    assert_eq!(spans(&rich.facets), [(5, 10), (15, 18)]);
}

#[test]
fn unbalanced_markdown_is_left_alone() {
    for input in ["[open](no close", "[](empty)", "no [link] here", "(x)[y]"] {
        let rich = strip_markdown(input);
        assert_eq!(rich.text, input);
        assert!(rich.facets.is_empty(), "{input}");
    }
}

#[test]
fn empty_input() {
    assert_eq!(strip_markdown(""), RichText::default());
}

#[tokio::test]
async fn plain_text_compiles_to_itself() -> Result<(), Error> {
    let pds = MockPds::new();
    let rich = compile("nothing to see here", &pds).await?;
    assert_eq!(rich.text, "nothing to see here");
    assert!(rich.facets.is_empty());
    Ok(())
}

#[tokio::test]
async fn native_facets_refer_to_the_clean_text() -> Result<(), Error> {
    let pds = MockPds::new().with_handle("alice.test", "did:plc:alice");
    let rich = compile("[docs](https://d.e) for @alice.test #help", &pds).await?;

    assert_eq!(rich.text, "docs for @alice.test #help");
    assert_eq!(
        rich.facets,
        [
            link_facet(0, 4, "https://d.e"),
            mention(9, 20, "did:plc:alice"),
            tag(21, 26, "help"),
        ]
    );
    assert_eq!(pds.calls(), [Call::ResolveHandle("alice.test".into())]);
    Ok(())
}

#[tokio::test]
async fn unresolvable_mentions_fail_the_edit() {
    let pds = MockPds::new();
    let err = compile("cc @ghost.test", &pds).await.unwrap_err();
    assert!(
        matches!(
            &err,
            Error::FacetDetection(XrpcError::Api { status: 400, error, .. }) if error == "InvalidRequest"
        ),
        "{err:?}"
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn bare_domains_become_links() -> Result<(), Error> {
    let pds = MockPds::new();
    let rich = compile("see example.com, or not.a.realtld", &pds).await?;
    assert_eq!(rich.facets, [link_facet(4, 15, "https://example.com")]);
    Ok(())
}

#[tokio::test]
async fn facets_are_sorted() -> Result<(), Error> {
    let pds = MockPds::new();
    let rich = compile("#a https://x.y [b](https://z) #c [d](https://w)", &pds).await?;
    let starts: Vec<_> = rich.facets.iter().map(|f| f.index.byte_start).collect();
    let mut sorted = starts.clone();
    sorted.sort_unstable();
    assert_eq!(starts, sorted);
    assert_eq!(rich.facets.len(), 5);
    Ok(())
}
