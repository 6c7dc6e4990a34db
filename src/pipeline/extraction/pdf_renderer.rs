//! Scanned-page rasters pulled straight out of a PDF with lopdf.
//!
//! Fallback for hosts without PDFium. Works when each page of a scan is a
//! single image XObject, which is how scanners and phone apps write them.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, RgbImage};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::debug;

use super::types::PdfPageRenderer;
use super::ExtractionError;

/// Returns the largest embedded image on a page, re-encoded as PNG.
/// `dpi` is ignored; the image comes out at its native resolution.
pub struct LopdfImageExtractor;

impl PdfPageRenderer for LopdfImageExtractor {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(load(pdf_bytes)?.get_pages().len())
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        let doc = load(pdf_bytes)?;
        let pages = doc.get_pages();
        let page_id = *pages
            .values()
            .nth(page_number)
            .ok_or_else(|| ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("Page not found (PDF has {} pages)", pages.len()),
            })?;

        let image = largest_page_image(&doc, page_id).map_err(|reason| {
            ExtractionError::PdfRendering {
                page: page_number,
                reason,
            }
        })?;

        let mut png = Cursor::new(Vec::new());
        image
            .write_to(&mut png, ImageOutputFormat::Png)
            .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;

        debug!(page = page_number, png_size = png.get_ref().len(), "Extracted page image from PDF");
        Ok(png.into_inner())
    }
}

fn load(pdf_bytes: &[u8]) -> Result<Document, ExtractionError> {
    Document::load_mem(pdf_bytes)
        .map_err(|e| ExtractionError::PdfParsing(format!("Failed to parse PDF: {e}")))
}

/// Page dict -> /Resources -> /XObject -> every /Subtype /Image, largest
/// by pixel count.
fn largest_page_image(doc: &Document, page_id: ObjectId) -> Result<DynamicImage, String> {
    let page = doc
        .get_dictionary(page_id)
        .map_err(|e| format!("Page object error: {e}"))?;
    let resources = dict_entry(doc, page, b"Resources")?;
    let xobjects = dict_entry(doc, resources, b"XObject")?;

    let mut best: Option<DynamicImage> = None;
    for (_name, entry) in xobjects.iter() {
        let Object::Stream(stream) = resolve(doc, entry) else {
            continue;
        };
        if !matches!(stream.dict.get(b"Subtype"), Ok(Object::Name(n)) if n == b"Image") {
            continue;
        }
        let image = match decode_stream(doc, stream) {
            Ok(image) => image,
            Err(reason) => {
                debug!(reason = %reason, "Skipping undecodable image XObject");
                continue;
            }
        };
        let pixels = |img: &DynamicImage| u64::from(img.width()) * u64::from(img.height());
        if best.as_ref().map_or(true, |prev| pixels(&image) > pixels(prev)) {
            best = Some(image);
        }
    }

    best.ok_or_else(|| "No image XObjects found on this page".to_string())
}

fn decode_stream(doc: &Document, stream: &Stream) -> Result<DynamicImage, String> {
    // DCTDecode content is a complete JPEG; so are some unfiltered TIFF/PNG payloads.
    let content = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    if let Ok(image) = image::load_from_memory(&content) {
        return Ok(image);
    }
    raw_pixels(doc, &stream.dict, content)
}

/// Rebuild an 8-bit gray or RGB raster from /Width, /Height and /ColorSpace.
fn raw_pixels(doc: &Document, dict: &Dictionary, pixels: Vec<u8>) -> Result<DynamicImage, String> {
    let width = int_entry(dict, b"Width")?;
    let height = int_entry(dict, b"Height")?;
    let bits = int_entry(dict, b"BitsPerComponent").unwrap_or(8);
    if bits != 8 {
        return Err(format!("Unsupported bits per component: {bits}"));
    }

    let gray = match dict.get(b"ColorSpace").map(|cs| resolve(doc, cs)) {
        Ok(Object::Name(name)) => name == b"DeviceGray",
        _ => false,
    };

    if gray {
        GrayImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(|| format!("Gray buffer does not fit {width}x{height}"))
    } else {
        RgbImage::from_raw(width, height, pixels)
            .map(DynamicImage::ImageRgb8)
            .ok_or_else(|| format!("RGB buffer does not fit {width}x{height}"))
    }
}

fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(obj),
        _ => obj,
    }
}

fn dict_entry<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Result<&'a Dictionary, String> {
    let name = String::from_utf8_lossy(key);
    let obj = dict.get(key).map_err(|_| format!("Missing /{name}"))?;
    resolve(doc, obj)
        .as_dict()
        .map_err(|_| format!("/{name} is not a dictionary"))
}

fn int_entry(dict: &Dictionary, key: &[u8]) -> Result<u32, String> {
    let name = String::from_utf8_lossy(key);
    let value = dict
        .get(key)
        .and_then(Object::as_i64)
        .map_err(|_| format!("Missing integer /{name}"))?;
    u32::try_from(value).map_err(|_| format!("/{name} out of range: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::dictionary;

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_pixel(width, height, image::Rgb([128, 128, 128]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut out, ImageOutputFormat::Jpeg(85))
            .unwrap();
        out.into_inner()
    }

    fn image_stream(width: i64, height: i64, color_space: &str, filter: Option<&str>, data: Vec<u8>) -> Stream {
        let mut dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
        };
        if let Some(filter) = filter {
            dict.set("Filter", Object::Name(filter.as_bytes().to_vec()));
        }
        let mut stream = Stream::new(dict, data);
        stream.allows_compression = false;
        stream
    }

    /// One page whose /XObject resources are `images`.
    fn scanned_pdf(images: Vec<(&str, Stream)>) -> Vec<u8> {
        let mut doc = Document::with_version("1.4");
        let mut xobjects = Dictionary::new();
        for (name, stream) in images {
            let id = doc.add_object(stream);
            xobjects.set(name, id);
        }
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            b"q 612 0 0 792 0 0 cm /Img1 Do Q".to_vec(),
        ));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! { "XObject" => xobjects },
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        });
        if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
            dict.set("Parent", pages_id);
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn jpeg_page_becomes_png() {
        let pdf = scanned_pdf(vec![("Img1", image_stream(200, 300, "DeviceRGB", Some("DCTDecode"), jpeg(200, 300)))]);
        let png = LopdfImageExtractor.render_page(&pdf, 0, 300).unwrap();
        assert_eq!(&png[0..4], b"\x89PNG");
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (200, 300));
    }

    #[test]
    fn raw_gray_pixels_are_rebuilt() {
        let pdf = scanned_pdf(vec![("Img1", image_stream(4, 3, "DeviceGray", None, vec![200; 12]))]);
        let png = LopdfImageExtractor.render_page(&pdf, 0, 300).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (4, 3));
    }

    #[test]
    fn largest_image_wins() {
        let pdf = scanned_pdf(vec![
            ("Small", image_stream(10, 10, "DeviceRGB", Some("DCTDecode"), jpeg(10, 10))),
            ("Img1", image_stream(120, 160, "DeviceRGB", Some("DCTDecode"), jpeg(120, 160))),
        ]);
        let png = LopdfImageExtractor.render_page(&pdf, 0, 300).unwrap();
        let img = image::load_from_memory(&png).unwrap();
        assert_eq!((img.width(), img.height()), (120, 160));
    }

    #[test]
    fn page_count_and_out_of_range() {
        let pdf = scanned_pdf(vec![("Img1", image_stream(4, 3, "DeviceGray", None, vec![0; 12]))]);
        assert_eq!(LopdfImageExtractor.page_count(&pdf).unwrap(), 1);
        let err = LopdfImageExtractor.render_page(&pdf, 5, 300).unwrap_err();
        assert!(matches!(err, ExtractionError::PdfRendering { page: 5, .. }));
    }

    #[test]
    fn page_without_images_is_error() {
        let pdf = scanned_pdf(vec![]);
        let err = LopdfImageExtractor.render_page(&pdf, 0, 300).unwrap_err();
        assert!(err.to_string().contains("No image XObjects"));
    }
}
