use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use super::images::{EmbeddedImage, ImageSource};
use crate::error::Result;
use crate::utils::escape_xml;

static IMG_SELECTOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img").expect("valid img selector"));
static VOID_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(area|base|br|col|embed|hr|img|input|link|meta|param|source|track|wbr)(\s[^>]*?)?/?>")
        .expect("valid void tag regex")
});

/// One page of rendered output.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub body: String,
    pub images: Vec<EmbeddedImage>,
}

/// A chapter rendered on its own, before being spliced into the book.
#[derive(Debug, Clone, PartialEq)]
pub struct SubDocument {
    pub title: String,
    pub pages: Vec<Page>,
}

/// Lays out one HTML document into pages.
pub trait PageRenderer {
    fn render(&self, title: &str, html: &str, images: &mut dyn ImageSource) -> Result<SubDocument>;
}

/// Splits HTML into XHTML pages at top-level block boundaries.
///
/// Every page holds at most `char_budget` characters of text, except when a
/// single block is larger on its own. An image costs half a page.
#[derive(Debug, Clone)]
pub struct XhtmlPageRenderer {
    char_budget: usize,
}

impl XhtmlPageRenderer {
    pub fn new(char_budget: usize) -> Self {
        Self {
            char_budget: char_budget.max(1),
        }
    }

    fn image_weight(&self) -> usize {
        (self.char_budget / 2).max(1)
    }

    fn render_text(&self, text: &str) -> Option<Block> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(Block {
            markup: format!("<p>{}</p>", escape_xml(text)),
            weight: text.chars().count(),
            images: Vec::new(),
        })
    }

    fn render_element(&self, element: ElementRef<'_>, images: &mut dyn ImageSource) -> Result<Block> {
        let mut markup = element.html();
        let mut weight = element.text().map(|t| t.chars().count()).sum::<usize>();
        let mut embedded = Vec::new();

        let mut tags: Vec<ElementRef<'_>> = element.select(&IMG_SELECTOR).collect();
        if element.value().name() == "img" && !tags.iter().any(|tag| tag.id() == element.id()) {
            tags.insert(0, element);
        }
        for img in tags {
            let original = img.html();
            let src = img.value().attr("src").map(str::trim).unwrap_or_default();
            if src.is_empty() {
                markup = markup.replace(&original, "");
                continue;
            }
            let image = images.embed(src)?;
            let replacement = format!(
                r#"<img src="../images/{}" alt="" width="{}" height="{}"/>"#,
                image.file_name, image.width, image.height
            );
            markup = markup.replace(&original, &replacement);
            weight += self.image_weight();
            if !embedded.contains(&image) {
                embedded.push(image);
            }
        }

        Ok(Block {
            markup: to_xhtml(&markup),
            weight,
            images: embedded,
        })
    }
}

impl PageRenderer for XhtmlPageRenderer {
    fn render(&self, title: &str, html: &str, images: &mut dyn ImageSource) -> Result<SubDocument> {
        let fragment = Html::parse_fragment(html);
        let mut pages = Vec::new();
        let mut current = PageBuilder::default();

        for node in fragment.root_element().children() {
            let block = if let Some(element) = ElementRef::wrap(node) {
                self.render_element(element, images)?
            } else if let Some(text) = node.value().as_text() {
                match self.render_text(text) {
                    Some(block) => block,
                    None => continue,
                }
            } else {
                continue;
            };
            if current.weight > 0 && current.weight + block.weight > self.char_budget {
                pages.push(std::mem::take(&mut current).finish());
            }
            current.push(block);
        }
        if !current.is_empty() || pages.is_empty() {
            pages.push(current.finish());
        }

        Ok(SubDocument {
            title: title.to_string(),
            pages,
        })
    }
}

struct Block {
    markup: String,
    weight: usize,
    images: Vec<EmbeddedImage>,
}

#[derive(Default)]
struct PageBuilder {
    body: String,
    weight: usize,
    images: Vec<EmbeddedImage>,
}

impl PageBuilder {
    fn push(&mut self, block: Block) {
        if !self.body.is_empty() {
            self.body.push('\n');
        }
        self.body.push_str(&block.markup);
        self.weight += block.weight;
        for image in block.images {
            if !self.images.contains(&image) {
                self.images.push(image);
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    fn finish(self) -> Page {
        Page {
            body: self.body,
            images: self.images,
        }
    }
}

/// Patches HTML serialization into well-formed XHTML: void elements are
/// self-closed and the `nbsp` entity, unknown to XML, becomes numeric.
fn to_xhtml(markup: &str) -> String {
    let xhtml = markup.replace("&nbsp;", "&#160;");
    VOID_TAG.replace_all(&xhtml, "<$1$2/>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::epub::images::ImageTable;
    use crate::epub::images::tests::png;
    use crate::error::Error;
    use crate::models::Chapter;

    fn empty_table() -> ImageTable {
        ImageTable::from_chapters(std::iter::empty::<&Chapter>(), (550, 500))
    }

    fn paragraphs(count: usize, len: usize) -> String {
        (0..count).map(|_| format!("<p>{}</p>", "x".repeat(len))).collect()
    }

    #[test]
    fn short_chapter_is_one_page() {
        let renderer = XhtmlPageRenderer::new(3000);
        let sub = renderer
            .render("One", "<h2>One</h2><p>Hello<br>world&nbsp;!</p>", &mut empty_table())
            .unwrap();

        assert_eq!(sub.title, "One");
        assert_eq!(sub.pages.len(), 1);
        assert_eq!(sub.pages[0].body, "<h2>One</h2>\n<p>Hello<br/>world&#160;!</p>");
    }

    #[test]
    fn void_elements_are_self_closed() {
        let sub = XhtmlPageRenderer::new(3000)
            .render(
                "V",
                r#"<p>a<br class="x">b</p><hr style="c"><p>x<wbr>y</p><table><col span="2"></table>"#,
                &mut empty_table(),
            )
            .unwrap();

        let body = &sub.pages[0].body;
        assert!(body.contains(r#"<p>a<br class="x"/>b</p>"#), "{body}");
        assert!(body.contains(r#"<hr style="c"/>"#), "{body}");
        assert!(body.contains("<p>x<wbr/>y</p>"), "{body}");
        assert!(body.contains(r#"<col span="2"/>"#), "{body}");
        assert!(!body.contains("//>"));
    }

    #[test]
    fn embedded_image_tags_are_not_closed_twice() {
        assert_eq!(
            to_xhtml(r#"<p><img src="../images/image_0001.png" alt="" width="1" height="1"/><br></p>"#),
            r#"<p><img src="../images/image_0001.png" alt="" width="1" height="1"/><br/></p>"#
        );
    }

    #[test]
    fn long_chapter_is_split_at_blocks() {
        let renderer = XhtmlPageRenderer::new(100);
        let sub = renderer.render("Long", &paragraphs(5, 40), &mut empty_table()).unwrap();

        // Two 40-character paragraphs fit in 100 characters, a third does not.
        assert_eq!(sub.pages.len(), 3);
        assert_eq!(sub.pages[2].body.matches("<p>").count(), 1);
    }

    #[test]
    fn oversized_block_gets_own_page() {
        let renderer = XhtmlPageRenderer::new(10);
        let sub = renderer
            .render("Big", &format!("<p>a</p><p>{}</p><p>b</p>", "y".repeat(50)), &mut empty_table())
            .unwrap();
        assert_eq!(sub.pages.len(), 3);
    }

    #[test]
    fn empty_chapter_still_has_a_page() {
        let sub = XhtmlPageRenderer::new(100).render("Empty", "", &mut empty_table()).unwrap();
        assert_eq!(sub.pages.len(), 1);
        assert!(sub.pages[0].body.is_empty());
    }

    #[test]
    fn loose_text_is_wrapped() {
        let sub = XhtmlPageRenderer::new(100)
            .render("T", "plain & simple<p>para</p>", &mut empty_table())
            .unwrap();
        assert_eq!(sub.pages[0].body, "<p>plain &amp; simple</p>\n<p>para</p>");
    }

    #[test]
    fn images_are_embedded_and_rewritten() {
        let chapter = Chapter::builder().image("pic.png", png(1100, 1000)).build();
        let mut table = ImageTable::from_chapters([&chapter], (550, 500));

        let sub = XhtmlPageRenderer::new(3000)
            .render("Pic", r#"<p><img src="pic.png"></p><img src="pic.png">"#, &mut table)
            .unwrap();

        let page = &sub.pages[0];
        assert_eq!(page.images.len(), 1);
        assert_eq!((page.images[0].width, page.images[0].height), (550, 500));
        assert_eq!(
            page.body.matches(r#"<img src="../images/image_0001.png" alt="" width="550" height="500"/>"#).count(),
            2
        );
    }

    #[test]
    fn unknown_image_aborts_render() {
        let err = XhtmlPageRenderer::new(3000)
            .render("X", r#"<p><img src="https://cdn/missing.png"></p>"#, &mut empty_table())
            .unwrap_err();
        assert!(matches!(err, Error::MissingImage(_)));
    }
}
