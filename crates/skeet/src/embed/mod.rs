//! # Embed Reconciliation
//!
//! A post's attachments exist twice: the *display* tree the AppView hydrates for rendering
//! (thumbnails, author previews) and the *record* tree that is actually persisted (blob and
//! strong refs). Both are modelled by one generic [`Node`], parameterized over a [`Shape`] that
//! supplies the concrete image, external card and quote types.
//!
//! Edits go exclusively through [`Attachments`], which owns both trees and applies each
//! operation to them in lockstep. Every transition is written once, generically, so the trees
//! cannot drift apart.
//!
//! ## Transitions
//! * adding an image appends to an existing image set (bare, or the media half of a quote),
//!   turns a bare quote into a quote with media, and replaces an external card outright
//! * removing the last image collapses the media half away, leaving a bare quote or nothing
//! * removing a quote leaves only its media, removing an external card leaves only its quote
#[cfg(test)]
pub(crate) mod tests;

use std::fmt::Debug;

use atrium_api::app::bsky::embed::record_with_media::{MainMediaRefs, ViewMediaRefs};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::{smallvec, SmallVec};
use thiserror::Error;

use crate::lexicon::{
    external, images, post_from_unknown, record, record_with_media, PostViewEmbedRefs,
    RecordEmbedRefs, StrongRef, Union,
};
use crate::swap::EmbedChange;

/// The most images a single post may carry.
pub const MAX_IMAGES: usize = 4;

/// An ordered image set in the given shape.
pub type Images<S> = SmallVec<[<S as Shape>::Image; MAX_IMAGES]>;

mod private {
    /// a marker trait to seal the [`Shape`](super::Shape) trait
    pub trait Sealed {}
}

/// One of the two parallel representations of an embed.
pub trait Shape: private::Sealed + Sized {
    type Image: Clone + Debug + PartialEq;
    type External: Clone + Debug + PartialEq;
    type Quote: Clone + Debug + PartialEq;
    /// The open union a post carries an embed of this shape in.
    type Wire: Clone + Debug + PartialEq + Serialize + DeserializeOwned;

    fn lift(wire: Self::Wire) -> Node<Self>;
    /// Converts back to the wire form; foreign embeds are handed back untouched.
    fn lower(node: Node<Self>) -> Self::Wire;
}

/// The hydrated view shape, used for rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Display;

/// The persisted record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stored;

#[derive(Debug, Clone, PartialEq)]
pub enum Node<S: Shape> {
    Images(Images<S>),
    External(S::External),
    Quote(S::Quote),
    QuoteWithMedia { quote: S::Quote, media: Media<S> },
    /// An embed kind this tool does not edit (e.g. video). Carried through verbatim.
    Foreign(S::Wire),
}

/// The media half of a [`Node::QuoteWithMedia`].
#[derive(Debug, Clone, PartialEq)]
pub enum Media<S: Shape> {
    Images(Images<S>),
    External(S::External),
}

/// The structural outline of a tree, used to check the two shapes agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Images(usize),
    External,
    Quote,
    QuoteWithImages(usize),
    QuoteWithExternal,
    Foreign,
}

/// A displayed image. Images shrunk before upload are flagged, so a front end can say so.
#[derive(Debug, Clone, PartialEq)]
pub struct ShownImage {
    pub view: images::ViewImage,
    pub resized: bool,
}

impl From<images::ViewImage> for ShownImage {
    fn from(view: images::ViewImage) -> Self {
        ShownImage {
            view,
            resized: false,
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EmbedError {
    /// The post already holds the maximum number of images.
    #[error("A post can hold at most {max} images")]
    AttachmentLimitExceeded { max: usize },
    /// The requested image does not exist.
    #[error("No image at position {index}, the post has {count}")]
    NoSuchImage { index: usize, count: usize },
    /// The display and record trees describe different attachments.
    #[error("Displayed attachments ({display:?}) do not match the stored ones ({record:?})")]
    Inconsistent {
        display: Option<Layout>,
        record: Option<Layout>,
    },
}

impl<S: Shape> Node<S> {
    pub fn layout(&self) -> Layout {
        match self {
            Node::Images(images) => Layout::Images(images.len()),
            Node::External(_) => Layout::External,
            Node::Quote(_) => Layout::Quote,
            Node::QuoteWithMedia {
                media: Media::Images(images),
                ..
            } => Layout::QuoteWithImages(images.len()),
            Node::QuoteWithMedia {
                media: Media::External(_),
                ..
            } => Layout::QuoteWithExternal,
            Node::Foreign(_) => Layout::Foreign,
        }
    }

    /// The images held either directly or in the media half of a quote.
    pub fn images(&self) -> &[S::Image] {
        match self {
            Node::Images(images)
            | Node::QuoteWithMedia {
                media: Media::Images(images),
                ..
            } => images.as_slice(),
            _ => &[],
        }
    }

    pub fn quote(&self) -> Option<&S::Quote> {
        match self {
            Node::Quote(quote) | Node::QuoteWithMedia { quote, .. } => Some(quote),
            _ => None,
        }
    }

    pub fn external(&self) -> Option<&S::External> {
        match self {
            Node::External(external)
            | Node::QuoteWithMedia {
                media: Media::External(external),
                ..
            } => Some(external),
            _ => None,
        }
    }

    fn with_image(this: Option<Self>, image: S::Image) -> Self {
        match this {
            Some(Node::Images(mut images)) => {
                images.push(image);
                Node::Images(images)
            }
            Some(Node::Quote(quote)) => Node::QuoteWithMedia {
                quote,
                media: Media::Images(smallvec![image]),
            },
            Some(Node::QuoteWithMedia {
                quote,
                media: Media::Images(mut images),
            }) => {
                images.push(image);
                Node::QuoteWithMedia {
                    quote,
                    media: Media::Images(images),
                }
            }
            // an image set and an external card cannot share the media slot
            Some(Node::QuoteWithMedia {
                quote,
                media: Media::External(_),
            }) => Node::QuoteWithMedia {
                quote,
                media: Media::Images(smallvec![image]),
            },
            None | Some(Node::External(_)) | Some(Node::Foreign(_)) => {
                Node::Images(smallvec![image])
            }
        }
    }

    fn without_image(self, index: usize) -> Option<Self> {
        match self {
            Node::Images(mut images) => {
                if index < images.len() {
                    images.remove(index);
                }
                (!images.is_empty()).then_some(Node::Images(images))
            }
            Node::QuoteWithMedia {
                quote,
                media: Media::Images(mut images),
            } => {
                if index < images.len() {
                    images.remove(index);
                }
                Some(if images.is_empty() {
                    Node::Quote(quote)
                } else {
                    Node::QuoteWithMedia {
                        quote,
                        media: Media::Images(images),
                    }
                })
            }
            other => Some(other),
        }
    }

    fn without_quote(self) -> Option<Self> {
        match self {
            Node::Quote(_) => None,
            Node::QuoteWithMedia { media, .. } => Some(match media {
                Media::Images(images) => Node::Images(images),
                Media::External(external) => Node::External(external),
            }),
            other => Some(other),
        }
    }

    fn without_external(self) -> Option<Self> {
        match self {
            Node::External(_) => None,
            Node::QuoteWithMedia {
                quote,
                media: Media::External(_),
            } => Some(Node::Quote(quote)),
            other => Some(other),
        }
    }
}

fn foreign<S: Shape>(wire: S::Wire) -> Node<S> {
    let value = serde_json::to_value(&wire).ok();
    let kind = value
        .as_ref()
        .and_then(|v| v.get("$type"))
        .and_then(serde_json::Value::as_str);
    tracing::debug!(kind, "Carrying unsupported embed through untouched");
    Node::Foreign(wire)
}

fn shown(view: &images::View) -> Images<Display> {
    view.images.iter().cloned().map(ShownImage::from).collect()
}

fn stored(main: &images::Main) -> Images<Stored> {
    main.images.iter().cloned().collect()
}

impl Display {
    fn known(wire: &Union<PostViewEmbedRefs>) -> Option<Node<Self>> {
        let Union::Refs(refs) = wire else {
            return None;
        };
        Some(match refs {
            PostViewEmbedRefs::AppBskyEmbedImagesView(view) => Node::Images(shown(view)),
            PostViewEmbedRefs::AppBskyEmbedExternalView(view) => {
                Node::External(view.external.clone())
            }
            PostViewEmbedRefs::AppBskyEmbedRecordView(view) => Node::Quote(view.record.clone()),
            PostViewEmbedRefs::AppBskyEmbedRecordWithMediaView(view) => Node::QuoteWithMedia {
                quote: view.record.record.clone(),
                media: match &view.media {
                    Union::Refs(ViewMediaRefs::AppBskyEmbedImagesView(media)) => {
                        Media::Images(shown(media))
                    }
                    Union::Refs(ViewMediaRefs::AppBskyEmbedExternalView(media)) => {
                        Media::External(media.external.clone())
                    }
                    _ => return None,
                },
            },
            PostViewEmbedRefs::AppBskyEmbedVideoView(_) => return None,
        })
    }
}

impl Shape for Display {
    type Image = ShownImage;
    type External = external::ViewExternal;
    type Quote = Union<record::ViewRecordRefs>;
    type Wire = Union<PostViewEmbedRefs>;

    fn lift(wire: Self::Wire) -> Node<Self> {
        Display::known(&wire).unwrap_or_else(|| foreign(wire))
    }

    fn lower(node: Node<Self>) -> Self::Wire {
        let image_set = |set: Images<Self>| -> Box<images::View> {
            Box::new(
                images::ViewData {
                    images: set.into_iter().map(|i| i.view).collect(),
                }
                .into(),
            )
        };
        let card = |external: external::ViewExternal| -> Box<external::View> {
            Box::new(external::ViewData { external }.into())
        };
        Union::Refs(match node {
            Node::Images(i) => PostViewEmbedRefs::AppBskyEmbedImagesView(image_set(i)),
            Node::External(e) => PostViewEmbedRefs::AppBskyEmbedExternalView(card(e)),
            Node::Quote(record) => PostViewEmbedRefs::AppBskyEmbedRecordView(Box::new(
                record::ViewData { record }.into(),
            )),
            Node::QuoteWithMedia { quote, media } => {
                PostViewEmbedRefs::AppBskyEmbedRecordWithMediaView(Box::new(
                    record_with_media::ViewData {
                        media: Union::Refs(match media {
                            Media::Images(i) => ViewMediaRefs::AppBskyEmbedImagesView(image_set(i)),
                            Media::External(e) => {
                                ViewMediaRefs::AppBskyEmbedExternalView(card(e))
                            }
                        }),
                        record: record::ViewData { record: quote }.into(),
                    }
                    .into(),
                ))
            }
            Node::Foreign(wire) => return wire,
        })
    }
}

impl Stored {
    fn known(wire: &Union<RecordEmbedRefs>) -> Option<Node<Self>> {
        let Union::Refs(refs) = wire else {
            return None;
        };
        Some(match refs {
            RecordEmbedRefs::AppBskyEmbedImagesMain(main) => Node::Images(stored(main)),
            RecordEmbedRefs::AppBskyEmbedExternalMain(main) => {
                Node::External(main.external.clone())
            }
            RecordEmbedRefs::AppBskyEmbedRecordMain(main) => Node::Quote(main.record.clone()),
            RecordEmbedRefs::AppBskyEmbedRecordWithMediaMain(main) => Node::QuoteWithMedia {
                quote: main.record.record.clone(),
                media: match &main.media {
                    Union::Refs(MainMediaRefs::AppBskyEmbedImagesMain(media)) => {
                        Media::Images(stored(media))
                    }
                    Union::Refs(MainMediaRefs::AppBskyEmbedExternalMain(media)) => {
                        Media::External(media.external.clone())
                    }
                    _ => return None,
                },
            },
            RecordEmbedRefs::AppBskyEmbedVideoMain(_) => return None,
        })
    }
}

impl Shape for Stored {
    type Image = images::Image;
    type External = external::External;
    type Quote = StrongRef;
    type Wire = Union<RecordEmbedRefs>;

    fn lift(wire: Self::Wire) -> Node<Self> {
        Stored::known(&wire).unwrap_or_else(|| foreign(wire))
    }

    fn lower(node: Node<Self>) -> Self::Wire {
        let image_set = |set: Images<Self>| -> Box<images::Main> {
            Box::new(
                images::MainData {
                    images: set.into_vec(),
                }
                .into(),
            )
        };
        let card = |external: external::External| -> Box<external::Main> {
            Box::new(external::MainData { external }.into())
        };
        Union::Refs(match node {
            Node::Images(i) => RecordEmbedRefs::AppBskyEmbedImagesMain(image_set(i)),
            Node::External(e) => RecordEmbedRefs::AppBskyEmbedExternalMain(card(e)),
            Node::Quote(record) => RecordEmbedRefs::AppBskyEmbedRecordMain(Box::new(
                record::MainData { record }.into(),
            )),
            Node::QuoteWithMedia { quote, media } => {
                RecordEmbedRefs::AppBskyEmbedRecordWithMediaMain(Box::new(
                    record_with_media::MainData {
                        media: Union::Refs(match media {
                            Media::Images(i) => MainMediaRefs::AppBskyEmbedImagesMain(image_set(i)),
                            Media::External(e) => {
                                MainMediaRefs::AppBskyEmbedExternalMain(card(e))
                            }
                        }),
                        record: record::MainData { record: quote }.into(),
                    }
                    .into(),
                ))
            }
            Node::Foreign(wire) => return wire,
        })
    }
}

impl private::Sealed for Display {}
impl private::Sealed for Stored {}

impl<S: Shape + Clone> Serialize for Node<S> {
    fn serialize<Se: Serializer>(&self, serializer: Se) -> Result<Se::Ok, Se::Error> {
        S::lower(self.clone()).serialize(serializer)
    }
}

impl<'de, S: Shape> Deserialize<'de> for Node<S> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        S::Wire::deserialize(deserializer).map(S::lift)
    }
}

/// The URI of a displayed quote, when the AppView disclosed one.
pub fn quote_uri(quote: &Union<record::ViewRecordRefs>) -> Option<&str> {
    use record::ViewRecordRefs as Quoted;
    match quote {
        Union::Refs(Quoted::ViewRecord(r)) => Some(&r.uri),
        Union::Refs(Quoted::ViewNotFound(r)) => Some(&r.uri),
        Union::Refs(Quoted::ViewBlocked(r)) => Some(&r.uri),
        Union::Refs(Quoted::ViewDetached(r)) => Some(&r.uri),
        _ => None,
    }
}

/// The text of a displayed quote, if it is a post the viewer may see.
pub fn quote_text(quote: &Union<record::ViewRecordRefs>) -> Option<String> {
    match quote {
        Union::Refs(record::ViewRecordRefs::ViewRecord(r)) => {
            post_from_unknown(&r.value).ok().map(|post| post.data.text)
        }
        _ => None,
    }
}

/// A newly uploaded image, in both shapes.
#[derive(Debug, Clone, PartialEq)]
pub struct NewImage {
    pub display: ShownImage,
    pub record: images::Image,
}

/// The paired display and record trees of one post, edited together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attachments {
    display: Option<Node<Display>>,
    record: Option<Node<Stored>>,
}

impl Attachments {
    /// Pairs up the two trees, refusing any pair whose layouts disagree.
    pub fn new(
        display: Option<Node<Display>>,
        record: Option<Node<Stored>>,
    ) -> Result<Self, EmbedError> {
        let (d, r) = (
            display.as_ref().map(Node::layout),
            record.as_ref().map(Node::layout),
        );
        if d != r {
            return Err(EmbedError::Inconsistent {
                display: d,
                record: r,
            });
        }
        Ok(Attachments { display, record })
    }

    pub fn display(&self) -> Option<&Node<Display>> {
        self.display.as_ref()
    }

    pub fn record(&self) -> Option<&Node<Stored>> {
        self.record.as_ref()
    }

    pub fn layout(&self) -> Option<Layout> {
        self.record.as_ref().map(Node::layout)
    }

    pub fn is_empty(&self) -> bool {
        self.record.is_none()
    }

    pub fn image_count(&self) -> usize {
        self.record.as_ref().map_or(0, |n| n.images().len())
    }

    /// How many more images fit before the limit.
    pub fn remaining(&self) -> usize {
        MAX_IMAGES.saturating_sub(self.image_count())
    }

    /// Attaches an image. On failure both trees are left exactly as they were.
    pub fn add_image(&mut self, image: NewImage) -> Result<(), EmbedError> {
        if self.image_count() >= MAX_IMAGES {
            return Err(EmbedError::AttachmentLimitExceeded { max: MAX_IMAGES });
        }
        if self.record.as_ref().and_then(Node::external).is_some() {
            tracing::info!("Replacing the external link card with an image");
        }
        self.display = Some(Node::with_image(self.display.take(), image.display));
        self.record = Some(Node::with_image(self.record.take(), image.record));
        Ok(())
    }

    pub fn remove_image(&mut self, index: usize) -> Result<(), EmbedError> {
        let count = self.image_count();
        if index >= count {
            return Err(EmbedError::NoSuchImage { index, count });
        }
        self.display = self.display.take().and_then(|n| n.without_image(index));
        self.record = self.record.take().and_then(|n| n.without_image(index));
        Ok(())
    }

    pub fn remove_quote(&mut self) {
        self.display = self.display.take().and_then(Node::without_quote);
        self.record = self.record.take().and_then(Node::without_quote);
    }

    pub fn remove_external(&mut self) {
        self.display = self.display.take().and_then(Node::without_external);
        self.record = self.record.take().and_then(Node::without_external);
    }

    pub fn clear(&mut self) {
        self.display = None;
        self.record = None;
    }

    /// The record tree as an explicit embed change: a replacement, or a removal when empty.
    pub fn into_change(self) -> EmbedChange {
        match self.record {
            Some(node) => EmbedChange::Replace(node),
            None => EmbedChange::Clear,
        }
    }
}
