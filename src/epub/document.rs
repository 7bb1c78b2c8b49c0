use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use zip::CompressionMethod;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use super::render::Page;
use crate::error::Result;
use crate::models::Novel;
use crate::utils::{escape_xml, url_extension};

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
    <rootfiles>
        <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
    </rootfiles>
</container>"#;

/// A paginated output document that pages can be appended to.
pub trait OutputDocument {
    /// Starts a new navigable section; following pages belong to it.
    fn begin_section(&mut self, title: &str);
    fn append_page(&mut self, page: Page);
    fn page_count(&self) -> usize;
    fn save(&self, path: &Path) -> Result<()>;
}

#[derive(Debug, Clone, Default)]
pub struct BookMetadata {
    pub identifier: String,
    pub title: String,
    pub author: String,
    pub description: String,
    pub language: String,
    /// Local cover file, embedded when it exists at save time.
    pub cover: Option<PathBuf>,
}

impl BookMetadata {
    pub fn from_novel(novel: &Novel) -> Self {
        let identifier = if novel.url.is_empty() {
            format!("ranobe-fetch:{}", novel.name)
        } else {
            novel.url.clone()
        };
        Self {
            identifier,
            title: novel.name.clone(),
            author: novel.author.clone(),
            description: novel.description.clone(),
            language: "ru".to_string(),
            cover: novel.cover.as_ref().map(|cover| cover.path.clone()),
        }
    }
}

struct Section {
    title: String,
    first_page: usize,
}

/// EPUB 2 package built one page at a time.
pub struct EpubDocument {
    metadata: BookMetadata,
    pages: Vec<Page>,
    sections: Vec<Section>,
    images: BTreeMap<String, Arc<[u8]>>,
}

impl EpubDocument {
    pub fn new(metadata: BookMetadata) -> Self {
        Self {
            metadata,
            pages: Vec::new(),
            sections: Vec::new(),
            images: BTreeMap::new(),
        }
    }

    fn page_file(index: usize) -> String {
        format!("text/page_{:05}.xhtml", index + 1)
    }

    /// Title of the section a page belongs to.
    fn section_title(&self, page: usize) -> &str {
        self.sections
            .iter()
            .rev()
            .find(|section| section.first_page <= page)
            .map(|section| section.title.as_str())
            .unwrap_or(self.metadata.title.as_str())
    }

    fn cover(&self) -> Result<Option<(String, Vec<u8>)>> {
        let Some(path) = self.metadata.cover.as_ref().filter(|path| path.is_file()) else {
            return Ok(None);
        };
        let extension = url_extension(&path.to_string_lossy()).unwrap_or("jpg").to_lowercase();
        let bytes = std::fs::read(path)?;
        Ok(Some((format!("images/cover.{}", extension), bytes)))
    }

    fn page_xhtml(&self, index: usize, page: &Page) -> String {
        let title = escape_xml(self.section_title(index));
        let mut xhtml = String::new();

        xhtml.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
    <title>"#);
        xhtml.push_str(&title);
        xhtml.push_str(r#"</title>
    <meta http-equiv="Content-Type" content="text/html; charset=UTF-8"/>
</head>
<body>
    <div class="chapter-content">
"#);
        xhtml.push_str(&page.body);
        xhtml.push_str(r#"
    </div>
</body>
</html>"#);
        xhtml
    }

    fn content_opf(&self, cover: Option<&str>) -> String {
        let meta = &self.metadata;
        let mut opf = String::new();

        opf.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>
<package version="2.0" xmlns="http://www.idpf.org/2007/opf" unique-identifier="BookId">
    <metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
        <dc:identifier id="BookId">"#);
        opf.push_str(&escape_xml(&meta.identifier));
        opf.push_str("</dc:identifier>\n        <dc:title>");
        opf.push_str(&escape_xml(&meta.title));
        opf.push_str("</dc:title>\n        <dc:language>");
        opf.push_str(&escape_xml(&meta.language));
        opf.push_str("</dc:language>\n        <dc:creator opf:role=\"aut\">");
        opf.push_str(&escape_xml(&meta.author));
        opf.push_str("</dc:creator>");
        if !meta.description.is_empty() {
            opf.push_str("\n        <dc:description>");
            opf.push_str(&escape_xml(&meta.description));
            opf.push_str("</dc:description>");
        }
        opf.push_str("\n        <dc:date>");
        opf.push_str(&chrono::Local::now().format("%Y-%m-%d").to_string());
        opf.push_str("</dc:date>\n        <meta name=\"generator\" content=\"ranobe-fetch\"/>");
        if cover.is_some() {
            opf.push_str("\n        <meta name=\"cover\" content=\"cover-image\"/>");
        }
        opf.push_str("\n    </metadata>\n    <manifest>");

        opf.push_str(r#"
        <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>"#);
        if let Some(cover) = cover {
            opf.push_str(&format!(
                r#"
        <item id="cover-image" href="{}" media-type="{}"/>"#,
                cover,
                media_type(cover)
            ));
        }
        for (i, name) in self.images.keys().enumerate() {
            opf.push_str(&format!(
                r#"
        <item id="image{}" href="images/{}" media-type="image/png"/>"#,
                i + 1,
                name
            ));
        }
        for i in 0..self.pages.len() {
            opf.push_str(&format!(
                r#"
        <item id="page{}" href="{}" media-type="application/xhtml+xml"/>"#,
                i + 1,
                Self::page_file(i)
            ));
        }

        opf.push_str("\n    </manifest>\n    <spine toc=\"ncx\">");
        for i in 0..self.pages.len() {
            opf.push_str(&format!("\n        <itemref idref=\"page{}\"/>", i + 1));
        }
        opf.push_str("\n    </spine>\n</package>");
        opf
    }

    fn toc_ncx(&self) -> String {
        let mut ncx = String::new();

        ncx.push_str(r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx version="2005-1" xmlns="http://www.daisy.org/z3986/2005/ncx/">
    <head>
        <meta name="dtb:uid" content=""#);
        ncx.push_str(&escape_xml(&self.metadata.identifier));
        ncx.push_str(&format!(
            r#""/>
        <meta name="dtb:depth" content="1"/>
        <meta name="dtb:totalPageCount" content="{}"/>
        <meta name="dtb:maxPageNumber" content="0"/>
    </head>
    <docTitle>
        <text>"#,
            self.pages.len()
        ));
        ncx.push_str(&escape_xml(&self.metadata.title));
        ncx.push_str("</text>\n    </docTitle>\n    <navMap>");

        for (i, section) in self.sections.iter().enumerate() {
            if section.first_page >= self.pages.len() {
                continue;
            }
            ncx.push_str(&format!(
                r#"
        <navPoint id="navPoint{0}" playOrder="{0}">
            <navLabel>
                <text>{1}</text>
            </navLabel>
            <content src="{2}"/>
        </navPoint>"#,
                i + 1,
                escape_xml(&section.title),
                Self::page_file(section.first_page)
            ));
        }

        ncx.push_str("\n    </navMap>\n</ncx>");
        ncx
    }
}

impl OutputDocument for EpubDocument {
    fn begin_section(&mut self, title: &str) {
        self.sections.push(Section {
            title: title.to_string(),
            first_page: self.pages.len(),
        });
    }

    fn append_page(&mut self, page: Page) {
        for image in &page.images {
            self.images
                .entry(image.file_name.clone())
                .or_insert_with(|| image.data.clone());
        }
        self.pages.push(page);
    }

    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn save(&self, path: &Path) -> Result<()> {
        let cover = self.cover()?;
        let mut zip = ZipWriter::new(BufWriter::new(File::create(path)?));

        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        // The mimetype entry must come first and stay uncompressed.
        zip.start_file("mimetype", stored)?;
        zip.write_all(b"application/epub+zip")?;

        zip.start_file("META-INF/container.xml", deflated)?;
        zip.write_all(CONTAINER_XML.as_bytes())?;

        zip.start_file("OEBPS/content.opf", deflated)?;
        zip.write_all(self.content_opf(cover.as_ref().map(|(name, _)| name.as_str())).as_bytes())?;

        zip.start_file("OEBPS/toc.ncx", deflated)?;
        zip.write_all(self.toc_ncx().as_bytes())?;

        for (i, page) in self.pages.iter().enumerate() {
            zip.start_file(format!("OEBPS/{}", Self::page_file(i)), deflated)?;
            zip.write_all(self.page_xhtml(i, page).as_bytes())?;
        }

        // PNG data is already compressed.
        for (name, data) in &self.images {
            zip.start_file(format!("OEBPS/images/{}", name), stored)?;
            zip.write_all(data)?;
        }
        if let Some((name, bytes)) = &cover {
            zip.start_file(format!("OEBPS/{}", name), stored)?;
            zip.write_all(bytes)?;
        }

        let mut writer = zip.finish()?;
        writer.flush()?;
        Ok(())
    }
}

fn media_type(file: &str) -> &'static str {
    match url_extension(file).map(str::to_ascii_lowercase).as_deref() {
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "image/jpeg",
    }
}
