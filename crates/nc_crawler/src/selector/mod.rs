//! Extractor driven entirely by CSS selectors from configuration.

pub mod dates;
pub mod jsonld;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use nc_core::sanitizer::collapse_whitespace;
use nc_core::{ArticleRecord, ArticleStub, Error, Result};
use scraper::{ElementRef, Html};
use url::Url;

use crate::browser::{parse_selector, BrowserSession, Document, Readiness};
use crate::config::SourceDefinition;
use crate::extractor::PageExtractor;

pub use dates::parse_published;

pub struct SelectorExtractor {
    definition: SourceDefinition,
    offset: FixedOffset,
    list_readiness: Readiness,
    article_readiness: Readiness,
}

impl SelectorExtractor {
    /// Fails with `Error::Config` on an unusable offset or selector.
    pub fn new(definition: SourceDefinition) -> Result<Self> {
        let offset = definition
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::Config(format!(
                    "source '{}': utc_offset_minutes {} out of range",
                    definition.name, definition.utc_offset_minutes
                ))
            })?;

        let list = &definition.list;
        let article = &definition.article;
        let selectors = [Some(&list.item), Some(&list.link), Some(&article.title), Some(&article.content)]
            .into_iter()
            .chain([&list.title, &list.date, &list.image, &list.category].map(Option::as_ref))
            .chain([&article.date, &article.reporter, &article.category].map(Option::as_ref))
            .chain([&definition.ready_marker, &definition.article_ready_marker].map(Option::as_ref))
            .flatten();
        for selector in selectors {
            parse_selector(selector)
                .map_err(|e| Error::Config(format!("source '{}': {}", definition.name, e)))?;
        }

        Ok(Self {
            list_readiness: Readiness::from_marker(definition.ready_marker.as_deref()),
            article_readiness: Readiness::from_marker(definition.article_ready_marker.as_deref()),
            offset,
            definition,
        })
    }

    pub fn definition(&self) -> &SourceDefinition {
        &self.definition
    }

    pub fn page_url(&self, page: u32) -> String {
        match (&self.definition.first_page_url, page) {
            (Some(first), 1) => first.clone(),
            _ => self.definition.list_url.replace("{page}", &page.to_string()),
        }
    }

    pub fn parse_listing(&self, document: &Document) -> Result<Vec<ArticleStub>> {
        let base = Url::parse(document.url())?;
        let html = document.parse();
        let list = &self.definition.list;
        let item_selector = parse_selector(&list.item)?;
        let link_selector = parse_selector(&list.link)?;

        let mut stubs: Vec<ArticleStub> = Vec::new();
        for item in html.select(&item_selector) {
            let link = item
                .select(&link_selector)
                .next()
                .or_else(|| (item.value().name() == "a").then_some(item));
            let Some(link) = link else {
                continue;
            };
            let Some(url) = link.value().attr("href").and_then(|href| resolve(&base, href)) else {
                continue;
            };

            let title = match &list.title {
                Some(selector) => first_text(item, selector)?,
                None => None,
            }
            .or_else(|| link.value().attr("title").map(collapse_whitespace))
            .or_else(|| Some(element_text(link)))
            .filter(|t| !t.is_empty());
            if let Some(title) = &title {
                if self.definition.skip_title_markers.iter().any(|m| title.contains(m.as_str())) {
                    continue;
                }
            }

            let mut stub = ArticleStub::new(url);
            stub.title = title;
            if let Some(selector) = &list.date {
                stub.published_at = first_text(item, selector)?.and_then(|t| self.parse_date(&t));
            }
            if let Some(selector) = &list.image {
                stub.image_url = first_image(item, selector, &base)?;
            }
            stub.category = match &list.category {
                Some(selector) => first_text(item, selector)?,
                None => None,
            }
            .or_else(|| self.definition.default_category.clone());

            if !stubs.iter().any(|s| s.url == stub.url) {
                stubs.push(stub);
            }
        }
        Ok(stubs)
    }

    /// `Ok(None)` when the page has no title; an error when no publication
    /// date can be found anywhere.
    pub fn parse_article(&self, document: &Document, stub: &ArticleStub) -> Result<Option<ArticleRecord>> {
        let html = document.parse();
        let root = html.root_element();
        let selectors = &self.definition.article;

        let title = first_text(root, &selectors.title)?
            .or_else(|| jsonld::meta_content(&html, "meta[property='og:title']"))
            .or_else(|| stub.title.clone());
        let Some(title) = title.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        let published_at = self
            .article_date(&html)?
            .or(stub.published_at)
            .ok_or_else(|| Error::Extraction(format!("no publication date found on {}", stub.url)))?;

        let content_selector = parse_selector(&selectors.content)?;
        let content = html
            .select(&content_selector)
            .map(|el| el.text().collect::<String>().trim().to_string())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let mut record = ArticleRecord::new(&stub.url, &self.definition.name, title, published_at);
        if !content.is_empty() {
            record.content = Some(content);
        }
        record.description = jsonld::meta_content(&html, "meta[name='description']")
            .or_else(|| jsonld::meta_content(&html, "meta[property='og:description']"));
        record.image_url = jsonld::meta_content(&html, "meta[property='og:image']")
            .and_then(|src| resolve_str(document.url(), &src));

        record.reporter = match &selectors.reporter {
            Some(selector) => first_text(root, selector)?,
            None => None,
        }
        .or_else(|| {
            let authors = jsonld::extract_authors(&html);
            (!authors.is_empty()).then(|| authors.join(", "))
        });

        record.category = match &selectors.category {
            Some(selector) => first_text(root, selector)?,
            None => None,
        }
        .or_else(|| stub.category.clone())
        .or_else(|| self.definition.default_category.clone());

        Ok(Some(record))
    }

    fn article_date(&self, html: &Html) -> Result<Option<DateTime<Utc>>> {
        let from_selector = match &self.definition.article.date {
            Some(selector) => first_element(html.root_element(), selector)?.and_then(|el| {
                el.value()
                    .attr("datetime")
                    .and_then(|dt| self.parse_date(dt))
                    .or_else(|| self.parse_date(&element_text(el)))
            }),
            None => None,
        };
        Ok(from_selector
            .or_else(|| jsonld::date_published(html).and_then(|d| self.parse_date(&d)))
            .or_else(|| {
                jsonld::meta_content(html, "meta[property='article:published_time']")
                    .and_then(|d| self.parse_date(&d))
            }))
    }

    fn parse_date(&self, text: &str) -> Option<DateTime<Utc>> {
        parse_published(text, &self.definition.date_formats, self.offset)
    }
}

#[async_trait]
impl PageExtractor for SelectorExtractor {
    fn source(&self) -> &str {
        &self.definition.name
    }

    fn ad_phrases(&self) -> &[String] {
        &self.definition.ad_phrases
    }

    fn utc_offset(&self) -> FixedOffset {
        self.offset
    }

    async fn list_page(&self, session: &mut BrowserSession, page: u32) -> Result<Vec<ArticleStub>> {
        let url = self.page_url(page);
        let document = session.get(&url, &self.list_readiness).await?;
        self.parse_listing(&document)
    }

    async fn fetch_article(&self, session: &mut BrowserSession, stub: &ArticleStub) -> Result<Option<ArticleRecord>> {
        let document = session.get(&stub.url, &self.article_readiness).await?;
        self.parse_article(&document, stub)
    }
}

fn element_text(el: ElementRef<'_>) -> String {
    collapse_whitespace(&el.text().collect::<String>())
}

fn first_element<'a>(scope: ElementRef<'a>, selector: &str) -> Result<Option<ElementRef<'a>>> {
    let selector = parse_selector(selector)?;
    Ok(scope.select(&selector).next())
}

fn first_text(scope: ElementRef<'_>, selector: &str) -> Result<Option<String>> {
    Ok(first_element(scope, selector)?
        .map(element_text)
        .filter(|t| !t.is_empty()))
}

fn first_image(scope: ElementRef<'_>, selector: &str, base: &Url) -> Result<Option<String>> {
    Ok(first_element(scope, selector)?.and_then(|img| {
        let attrs = img.value();
        attrs
            .attr("data-src")
            .or_else(|| attrs.attr("src"))
            .and_then(|src| resolve(base, src))
    }))
}

fn resolve(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    let url = base.join(href).ok()?;
    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

fn resolve_str(base: &str, href: &str) -> Option<String> {
    Url::parse(base).ok().and_then(|base| resolve(&base, href))
}
