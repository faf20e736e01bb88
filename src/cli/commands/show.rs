use crate::cli::logging::LogValue;
use crate::cli::session::{self, Auth};

use clap::Parser;
use serde_json::json;
use skeet::embed::{quote_text, quote_uri, Display, Node};
use skeet::{Locator, Post};

#[derive(Parser, Debug)]
pub(in super::super) struct Args {
    /// Permalink or at:// URI of the post
    post: Locator,
    /// Print the post, record and rendered attachments as JSON
    #[arg(long)]
    json: bool,
}

pub(super) async fn run(service: Option<&str>, args: Args) -> anyhow::Result<()> {
    let editor = session::connect(service, Auth::Optional).await?;
    let post = editor.get_post(&args.post).await?;

    if args.json {
        let out = json!({
            "uri": post.at.to_string(),
            "cid": post.cid,
            "author": post.author,
            "record": post.record,
            "embed": post.attachments.display(),
        });
        println!("{}", out.as_json());
    } else {
        print!("{}", render(&post));
    }
    Ok(())
}

fn render(post: &Post) -> String {
    let mut out = format!(
        "{}\n@{} · {}\n\n{}\n",
        post.at,
        post.author.handle.as_str(),
        post.record.created_at.as_str(),
        post.text()
    );
    if let Some(node) = post.attachments.display() {
        out.push('\n');
        out.push_str(&describe(node));
    }
    out
}

fn describe(node: &Node<Display>) -> String {
    let mut lines = Vec::new();

    if let Some(quote) = node.quote() {
        let uri = quote_uri(quote).unwrap_or("(unavailable)");
        match quote_text(quote) {
            Some(text) => lines.push(format!("quote: {uri}\n  > {text}")),
            None => lines.push(format!("quote: {uri}")),
        }
    }
    for (i, image) in node.images().iter().enumerate() {
        let resized = if image.resized { " (resized)" } else { "" };
        let alt = if image.view.alt.is_empty() {
            "no alt text"
        } else {
            image.view.alt.as_str()
        };
        lines.push(format!("image {}: {alt}{resized}", i + 1));
    }
    if let Some(card) = node.external() {
        lines.push(format!("link: {} {}", card.uri, card.title));
    }
    if let Node::Foreign(wire) = node {
        let value = serde_json::to_value(wire).unwrap_or_default();
        let kind = value
            .get("$type")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("unknown");
        lines.push(format!("embed: {kind} (kept as is)"));
    }

    lines.iter().map(|l| format!("{l}\n")).collect()
}
