//! Markdown to HTML conversion with docbuild link conventions.
//!
//! Articles refer to each other with `$$/<chapter>/<article>#<section>` links and
//! to images with `$$/<relative path>`. Cross links are resolved through the
//! article cache, so a linked article must already own a remote id when the
//! linking article is rendered.

use pulldown_cmark::{CowStr, Event, Options, Parser, Tag, TagEnd, html};
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::sync::cache::CacheSet;

const INTERNAL_PREFIX: &str = "$$/";
const ANCHOR_PREFIX: &str = "DOCBUILD";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RenderError {
    #[error("link to unknown article: {0}")]
    UnknownArticle(String),
    #[error("linked article has no remote id yet: {0}")]
    UnpublishedArticle(String),
}

pub trait Render {
    fn render(&self, markdown: &str, caches: &CacheSet) -> Result<String, RenderError>;
}

/// Where cross-article links point to.
#[derive(Debug, Clone)]
pub enum LinkTarget {
    /// `<base>/a/solutions/articles/<id>` on a Freshdesk helpdesk.
    Freshdesk(Url),
    /// `<article>.html` next to the rendered file.
    HtmlFiles,
}

#[derive(Debug, Clone)]
pub struct HtmlRenderer {
    links: LinkTarget,
}

impl HtmlRenderer {
    pub fn new(links: LinkTarget) -> Self {
        Self { links }
    }

    fn article_href(
        &self,
        link: &InternalLink<'_>,
        caches: &CacheSet,
    ) -> Result<String, RenderError> {
        let base = match &self.links {
            LinkTarget::HtmlFiles => format!("{}.html", link.article),
            LinkTarget::Freshdesk(base) => {
                let record = caches
                    .articles
                    .get(link.article)
                    .ok_or_else(|| RenderError::UnknownArticle(link.article.to_string()))?;
                let id = record
                    .id
                    .ok_or_else(|| RenderError::UnpublishedArticle(link.article.to_string()))?;
                format!(
                    "{}/a/solutions/articles/{id}",
                    base.as_str().trim_end_matches('/')
                )
            }
        };
        Ok(match link.section {
            Some(section) => format!("{base}#{}", anchor_id(section)),
            None => base,
        })
    }

    fn rewrite_link(&self, dest: &str, caches: &CacheSet) -> Result<Option<String>, RenderError> {
        if let Some(section) = dest.strip_prefix('#') {
            return Ok(Some(format!("#{}", anchor_id(section))));
        }
        match InternalLink::parse(dest) {
            Some(link) => self.article_href(&link, caches).map(Some),
            None => Ok(None),
        }
    }
}

impl Render for HtmlRenderer {
    fn render(&self, markdown: &str, caches: &CacheSet) -> Result<String, RenderError> {
        let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
        let mut events: Vec<Event<'_>> = Parser::new_ext(markdown, options).collect();

        for index in 0..events.len() {
            let heading_text = match &events[index] {
                Event::Start(Tag::Heading { .. }) => Some(heading_text(&events[index + 1..])),
                _ => None,
            };
            match &mut events[index] {
                Event::Start(Tag::Heading { id, .. }) => {
                    if let Some(text) = heading_text {
                        *id = Some(CowStr::from(anchor_id(&text)));
                    }
                }
                Event::Start(Tag::Link { dest_url, .. }) => {
                    if let Some(href) = self.rewrite_link(dest_url, caches)? {
                        *dest_url = CowStr::from(href);
                    }
                }
                Event::Start(Tag::Image { dest_url, .. }) => {
                    let hosted = match dest_url.strip_prefix(INTERNAL_PREFIX) {
                        Some(relative) => {
                            let hosted = caches.images.get(relative).cloned();
                            if hosted.is_none() {
                                warn!(image = relative, "image has no hosted url");
                            }
                            hosted
                        }
                        None => None,
                    };
                    if let Some(hosted) = hosted {
                        *dest_url = CowStr::from(hosted);
                    }
                }
                _ => {}
            }
        }

        let mut out = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut out, events.into_iter());
        Ok(out)
    }
}

struct InternalLink<'a> {
    article: &'a str,
    section: Option<&'a str>,
}

impl<'a> InternalLink<'a> {
    fn parse(dest: &'a str) -> Option<Self> {
        let rest = dest.strip_prefix(INTERNAL_PREFIX)?;
        let (path, section) = match rest.split_once('#') {
            Some((path, section)) => (path, Some(section).filter(|s| !s.is_empty())),
            None => (rest, None),
        };
        let article = path.rsplit('/').find(|segment| !segment.is_empty())?;
        let article = article.strip_suffix(".md").unwrap_or(article);
        Some(Self { article, section })
    }
}

fn heading_text(events: &[Event<'_>]) -> String {
    let mut text = String::new();
    for event in events {
        match event {
            Event::End(TagEnd::Heading(_)) => break,
            Event::Text(part) | Event::Code(part) => text.push_str(part),
            _ => {}
        }
    }
    text
}

/// Stable element id for a heading: lower-cased word characters behind a fixed prefix.
pub fn anchor_id(text: &str) -> String {
    let mut id = String::from(ANCHOR_PREFIX);
    id.extend(
        text.to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '_'),
    );
    id
}
