use crate::config::Config;
use anyhow::{Context, Result};
use image::{Rgb, RgbImage, RgbaImage, codecs::jpeg::JpegEncoder};
use lopdf::{
    Document, Object, ObjectId, Stream,
    content::{Content, Operation},
    dictionary,
};
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

const PT_PER_MM: f32 = 72.0 / 25.4;

/// Streaming output document. It starts with one open page; every further
/// page is opened by an explicit page break.
pub trait DocumentBuilder {
    fn page_break(&mut self) -> Result<()>;
    /// Place `image` at the top-left of the current page, full page width.
    fn place_image(&mut self, image: &RgbaImage) -> Result<()>;
    fn page_count(&self) -> usize;
    fn finish(self) -> Result<Vec<u8>>
    where
        Self: Sized;
}

struct OpenPage {
    image: Option<PlacedImage>,
}

struct PlacedImage {
    xobject: ObjectId,
    height_mm: f32,
}

pub struct PdfBuilder {
    doc: Document,
    pages_id: ObjectId,
    kids: Vec<Object>,
    current: OpenPage,
    page_width_mm: f32,
    placeholder_height_mm: f32,
    jpeg_quality: u8,
}

impl PdfBuilder {
    pub fn new(cfg: &Config) -> Self {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        Self {
            doc,
            pages_id,
            kids: Vec::new(),
            current: OpenPage { image: None },
            page_width_mm: cfg.output.page_width_mm,
            placeholder_height_mm: cfg.output.placeholder_height_mm,
            jpeg_quality: cfg.output.jpeg_quality,
        }
    }

    fn close_current(&mut self) -> Result<()> {
        let page = std::mem::replace(&mut self.current, OpenPage { image: None });
        let width_pt = self.page_width_mm * PT_PER_MM;

        let (height_pt, contents, resources) = match page.image {
            Some(img) => {
                let height_pt = img.height_mm * PT_PER_MM;
                let content = Content {
                    operations: vec![
                        Operation::new("q", vec![]),
                        Operation::new(
                            "cm",
                            vec![
                                width_pt.into(),
                                0.into(),
                                0.into(),
                                height_pt.into(),
                                0.into(),
                                0.into(),
                            ],
                        ),
                        Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
                        Operation::new("Q", vec![]),
                    ],
                };
                let resources = dictionary! {
                    "XObject" => dictionary! { "Im0" => img.xobject },
                };
                (height_pt, content, resources)
            }
            None => (
                self.placeholder_height_mm * PT_PER_MM,
                Content { operations: vec![] },
                dictionary! {},
            ),
        };

        let encoded = contents.encode().with_context(|| "encoding page content")?;
        let content_id = self.doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = self.doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => self.pages_id,
            "MediaBox" => vec![0.into(), 0.into(), width_pt.into(), height_pt.into()],
            "Contents" => content_id,
            "Resources" => resources,
        });
        self.kids.push(page_id.into());
        Ok(())
    }

    fn encode_jpeg(&self, image: &RgbaImage) -> Result<Vec<u8>> {
        let rgb = RgbImage::from_fn(image.width(), image.height(), |x, y| {
            let p = image.get_pixel(x, y);
            Rgb([p[0], p[1], p[2]])
        });
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.jpeg_quality)
            .encode_image(&rgb)
            .with_context(|| "encoding page image as JPEG")?;
        Ok(out)
    }
}

impl DocumentBuilder for PdfBuilder {
    fn page_break(&mut self) -> Result<()> {
        self.close_current()
    }

    fn place_image(&mut self, image: &RgbaImage) -> Result<()> {
        if image.width() == 0 || image.height() == 0 {
            anyhow::bail!("cannot place an empty image");
        }
        let jpeg = self.encode_jpeg(image)?;
        let stream = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => i64::from(image.width()),
                "Height" => i64::from(image.height()),
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => "DCTDecode",
            },
            jpeg,
        )
        .with_compression(false);
        let xobject = self.doc.add_object(stream);
        let height_mm = image.height() as f32 * self.page_width_mm / image.width() as f32;
        self.current.image = Some(PlacedImage { xobject, height_mm });
        Ok(())
    }

    fn page_count(&self) -> usize {
        self.kids.len() + 1
    }

    fn finish(mut self) -> Result<Vec<u8>> {
        self.close_current()?;
        let count = self.kids.len() as i64;
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => std::mem::take(&mut self.kids),
            "Count" => count,
        };
        self.doc.objects.insert(self.pages_id, Object::Dictionary(pages));
        let catalog_id = self.doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => self.pages_id,
        });
        self.doc.trailer.set("Root", catalog_id);

        let mut out = Vec::new();
        self.doc
            .save_to(&mut out)
            .with_context(|| "serializing PDF")?;
        Ok(out)
    }
}

/// Output file name derived from the page title, or the configured default.
pub fn output_file_name(cfg: &Config, title: Option<&str>) -> Result<String> {
    let hostile = Regex::new(r#"[\\/:*?"<>|\x00-\x1f]+"#)?;
    let cleaned = title
        .map(|t| {
            let normalized: String = t.nfkc().collect();
            let stripped = hostile.replace_all(&normalized, " ");
            stripped
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_default();

    let truncated: String = cleaned
        .chars()
        .take(cfg.output.title_max_chars)
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string();

    if truncated.is_empty() {
        Ok(cfg.output.default_file_name.clone())
    } else {
        Ok(format!("{truncated}.pdf"))
    }
}
