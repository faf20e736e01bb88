//! # Editor
//!
//! The operations a front end drives: reading a post for editing, uploading images into its
//! attachments, and committing the edit.

use chrono::Utc;
use config::Credentials;

use atrium_api::types::string::Cid;

use crate::blob::{Pending, Upload, Uploader};
use crate::embed::{Attachments, Display, Shape, Stored, MAX_IMAGES};
use crate::lexicon::{post_from_unknown, Author, PostRecord};
use crate::pds::{Pds, Session, XrpcError};
use crate::reference::{self, Canonical, Locator};
use crate::swap::{self, Batch, EmbedChange};
use crate::{richtext, Error};

/// A post as loaded for editing.
#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub at: Canonical,
    pub cid: Cid,
    pub author: Author,
    pub record: PostRecord,
    pub attachments: Attachments,
}

impl Post {
    pub fn text(&self) -> &str {
        &self.record.text
    }
}

/// Edits posts through a [`Pds`].
#[derive(Debug)]
pub struct Editor<P> {
    pds: P,
}

fn not_found(at: &Canonical) -> impl FnOnce(XrpcError) -> Error + '_ {
    move |e| match e {
        XrpcError::NotFound(_) => Error::not_found(at),
        e => e.into(),
    }
}

impl<P: Pds> Editor<P> {
    pub fn new(pds: P) -> Self {
        Editor { pds }
    }

    pub fn pds(&self) -> &P {
        &self.pds
    }

    /// Signs in with the given credentials.
    pub async fn sign_in(&self, credentials: &Credentials) -> Result<Session, Error> {
        Ok(self.pds.create_session(credentials).await?)
    }

    /// Loads a post with both its display and record attachments.
    #[tracing::instrument(skip(self), fields(%locator), err)]
    pub async fn get_post(&self, locator: &Locator) -> Result<Post, Error> {
        let at = reference::resolve(locator, &self.pds).await?;
        let view = self
            .pds
            .get_post_view(&at)
            .await
            .map_err(not_found(&at))?
            .ok_or_else(|| Error::not_found(&at))?
            .data;
        let record = post_from_unknown(&view.record)?;

        let attachments = Attachments::new(
            view.embed.map(Display::lift),
            record.embed.clone().map(Stored::lift),
        )?;
        tracing::debug!(layout = ?attachments.layout(), "Loaded post");

        Ok(Post {
            at,
            cid: view.cid,
            author: view.author,
            record,
            attachments,
        })
    }

    /// Replaces the text, and optionally the embed, of a post in the signed in account.
    ///
    /// Returns the post's address, which is unchanged by the edit.
    #[tracing::instrument(skip(self, text, change), fields(%locator), err)]
    pub async fn edit_post(
        &self,
        locator: &Locator,
        text: &str,
        change: EmbedChange,
    ) -> Result<Canonical, Error> {
        let at = reference::resolve(locator, &self.pds).await?;

        let session = self.pds.session_did().await.ok_or(Error::AuthRequired)?;
        if *at.repo() != session {
            return Err(Error::NotOwner {
                repo: at.repo().as_str().to_owned(),
                session: session.as_str().to_owned(),
            });
        }

        let current = self
            .pds
            .get_record(&at)
            .await
            .map_err(not_found(&at))?;
        let current = post_from_unknown(&current.value)?;
        let rich = richtext::compile(text, &self.pds).await?;
        let record = swap::rebuild(current, rich, change, Utc::now());

        swap::execute(&self.pds, &Batch::swap(&at, record)?).await?;
        Ok(at)
    }

    pub async fn upload_image(&self, bytes: Vec<u8>, mime: &str) -> Result<Upload, Error> {
        Uploader::new(&self.pds).upload_image(bytes, mime).await
    }

    /// Uploads files into the free image slots of `attachments`, one after another.
    ///
    /// Each file gets its own result. Files beyond the free slots are not uploaded, and a
    /// failed file does not stop the ones after it.
    pub async fn upload_images(
        &self,
        files: Vec<Pending>,
        attachments: &mut Attachments,
    ) -> Vec<Result<(), Error>> {
        let slots = attachments.remaining();
        if files.len() > slots {
            tracing::warn!(
                files = files.len(),
                slots,
                "Only the first {slots} images will be attached"
            );
        }

        let mut results = Vec::with_capacity(files.len());
        for (i, file) in files.into_iter().enumerate() {
            let res = if i < slots {
                self.attach(file, attachments).await
            } else {
                Err(Error::AttachmentLimitExceeded { max: MAX_IMAGES })
            };
            if let Err(e) = &res {
                e.warn();
            }
            results.push(res);
        }
        results
    }

    async fn attach(&self, file: Pending, attachments: &mut Attachments) -> Result<(), Error> {
        let Pending {
            bytes,
            mime,
            alt,
            local_url,
        } = file;
        let upload = self.upload_image(bytes, &mime).await?;
        attachments.add_image(upload.into_image(alt, local_url))?;
        Ok(())
    }
}
