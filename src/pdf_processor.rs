//! # PDF Processing Module
//!
//! Questo modulo implementa il trasformatore di default per i documenti PDF,
//! lavorando direttamente sulla struttura del documento con `lopdf`.
//!
//! ## Pipeline di Ottimizzazione
//!
//! 1. **Parsing**: Carica il documento in memoria (errore se corrotto o cifrato)
//! 2. **Immagini per pagina**: Ricomprime in JPEG le immagini raster della pagina,
//!    anche quelle annidate nei Form XObject, alla qualità configurata
//!    (default 75), tenendo il risultato solo se più piccolo
//! 3. **Content stream per pagina**: Decodifica le operazioni, le riserializza
//!    in forma compatta e applica compressione Flate
//! 4. **Deduplicazione**: Unisce gli oggetti identici byte per byte (hash SHA-256
//!    su una codifica canonica), riscrivendo i riferimenti fino a punto fisso
//! 5. **Pruning**: Rimuove gli oggetti non più raggiungibili
//! 6. **Serializzazione**: Scrive il nuovo documento in un buffer
//!
//! ## Immagini supportate
//!
//! | Filtro                       | Colore                              | Bit | Ricompressione |
//! |------------------------------|-------------------------------------|-----|----------------|
//! | DCTDecode                    | DeviceRGB/DeviceGray, ICCBased N=3/1 | 8   | ✅             |
//! | FlateDecode/LZWDecode/nessuno | DeviceRGB/DeviceGray, ICCBased N=3/1 | 8   | ✅ (diventa DCTDecode) |
//! | Altri (JPX, JBIG2, CCITT...) | CMYK, Indexed, maschere...          | -   | ❌ (lasciate intatte) |
//!
//! ## Esempio:
//! ```ignore
//! let processor = PdfProcessor::new(75);
//! let optimized = processor.transform(&std::fs::read("doc.pdf")?)?;
//! ```

use crate::config::DEFAULT_IMAGE_QUALITY;
use crate::error::OptimizeError;
use crate::transformer::DocumentTransformer;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, ImageFormat};
use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Upper bound on deduplication passes; each pass can expose new duplicates
/// among the parents of merged objects.
const MAX_MERGE_PASSES: usize = 8;

/// Limit when walking up the page tree looking for inherited resources
const MAX_TREE_DEPTH: usize = 32;

/// Pixel layout of an image that can be re-encoded without colour conversion
#[derive(Debug, Clone, Copy, PartialEq)]
enum Channels {
    Rgb,
    Gray,
}

impl Channels {
    fn count(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Gray => 1,
        }
    }

    fn color_type(self) -> ColorType {
        match self {
            Self::Rgb => ColorType::Rgb8,
            Self::Gray => ColorType::L8,
        }
    }
}

/// How the pixels of a re-encodable image are stored today
#[derive(Debug, Clone, Copy, PartialEq)]
enum Storage {
    /// `DCTDecode`, decoded with the JPEG decoder
    Jpeg,
    /// Raw samples, optionally behind `FlateDecode`/`LZWDecode`
    Samples,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct RasterImage {
    storage: Storage,
    channels: Channels,
    width: u32,
    height: u32,
}

/// Default document transformer for PDF files
#[derive(Debug, Clone)]
pub struct PdfProcessor {
    image_quality: u8,
}

impl Default for PdfProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE_QUALITY)
    }
}

/// Counters collected during a single transform, logged at debug level
#[derive(Debug, Default)]
struct TransformSummary {
    pages: usize,
    images_recompressed: usize,
    content_streams: usize,
    objects_merged: usize,
    objects_pruned: usize,
}

impl PdfProcessor {
    /// Crea un processore con la qualità JPEG indicata (1-100)
    pub fn new(image_quality: u8) -> Self {
        Self {
            image_quality: image_quality.clamp(1, 100),
        }
    }

    pub fn image_quality(&self) -> u8 {
        self.image_quality
    }

    /// Re-encodes the raster images used by one page as JPEG.
    ///
    /// Images shared between pages are handled once, tracked through `seen`.
    fn recompress_page_images(
        &self,
        doc: &mut Document,
        page_id: ObjectId,
        seen: &mut HashSet<ObjectId>,
    ) -> usize {
        let mut recompressed = 0;

        for image_id in page_image_ids(doc, page_id) {
            if !seen.insert(image_id) {
                continue;
            }

            let Some(raster) = doc
                .get_object(image_id)
                .and_then(Object::as_stream)
                .ok()
                .and_then(|stream| raster_image(doc, &stream.dict))
            else {
                continue;
            };
            let Ok(stream) = doc.get_object_mut(image_id).and_then(|o| o.as_stream_mut()) else {
                continue;
            };

            match reencode_image(stream, raster, self.image_quality) {
                Ok(data) if data.len() < stream.content.len() => {
                    debug!(
                        "Image {:?} ({:?}): {} -> {} bytes",
                        image_id,
                        raster.storage,
                        stream.content.len(),
                        data.len()
                    );
                    stream.dict.remove(b"DecodeParms");
                    stream.dict.set("Filter", "DCTDecode");
                    stream.set_content(data);
                    recompressed += 1;
                }
                Ok(_) => debug!("Image {:?}: re-encoding not smaller, kept", image_id),
                Err(e) => debug!("Image {:?}: cannot re-encode ({})", image_id, e),
            }
        }

        recompressed
    }
}

impl DocumentTransformer for PdfProcessor {
    fn transform(&self, input: &[u8]) -> Result<Vec<u8>, OptimizeError> {
        let mut doc = Document::load_mem(input)?;
        if doc.is_encrypted() {
            return Err(OptimizeError::Transform(
                "encrypted documents are not supported".to_string(),
            ));
        }

        let mut summary = TransformSummary::default();
        let pages: Vec<ObjectId> = doc.get_pages().into_values().collect();
        let mut seen_images = HashSet::new();

        for page_id in pages {
            summary.pages += 1;
            summary.images_recompressed +=
                self.recompress_page_images(&mut doc, page_id, &mut seen_images);
            summary.content_streams += compact_page_contents(&mut doc, page_id);
        }

        summary.objects_merged = merge_identical_objects(&mut doc);
        summary.objects_pruned = doc.prune_objects().len();

        let mut output = Vec::with_capacity(input.len());
        doc.save_to(&mut output)
            .map_err(|e| OptimizeError::Transform(format!("cannot serialize document: {}", e)))?;

        debug!("Transform summary: {:?}", summary);
        Ok(output)
    }
}

/// Risolve un oggetto (inline o riferimento) in un dizionario
fn resolve_dictionary<'a>(doc: &'a Document, object: &'a Object) -> Option<&'a Dictionary> {
    match object {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

/// Finds the resources of a page, following `Parent` links for inherited ones
fn page_resources(doc: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let mut node = page_id;
    for _ in 0..MAX_TREE_DEPTH {
        let dict = doc.get_dictionary(node).ok()?;
        if let Ok(resources) = dict.get(b"Resources") {
            return resolve_dictionary(doc, resources);
        }
        node = dict.get(b"Parent").and_then(Object::as_reference).ok()?;
    }
    None
}

fn page_image_ids(doc: &Document, page_id: ObjectId) -> Vec<ObjectId> {
    let mut images = Vec::new();
    if let Some(resources) = page_resources(doc, page_id) {
        collect_images(doc, resources, &mut HashSet::new(), &mut images);
    }
    images
}

/// Image XObjects of a resource dictionary, including those drawn by its
/// Form XObjects. Each form is entered once.
fn collect_images(
    doc: &Document,
    resources: &Dictionary,
    forms: &mut HashSet<ObjectId>,
    images: &mut Vec<ObjectId>,
) {
    let Some(xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|object| resolve_dictionary(doc, object))
    else {
        return;
    };

    for (_, value) in xobjects.iter() {
        let Ok(id) = value.as_reference() else {
            continue;
        };
        let Ok(stream) = doc.get_object(id).and_then(Object::as_stream) else {
            continue;
        };

        if name_is(&stream.dict, b"Subtype", b"Image") {
            images.push(id);
        } else if name_is(&stream.dict, b"Subtype", b"Form") && forms.insert(id) {
            if let Some(inner) = stream
                .dict
                .get(b"Resources")
                .ok()
                .and_then(|object| resolve_dictionary(doc, object))
            {
                collect_images(doc, inner, forms, images);
            }
        }
    }
}

fn name_is(dict: &Dictionary, key: &[u8], expected: &[u8]) -> bool {
    dict.get(key)
        .and_then(Object::as_name)
        .map(|name| name == expected)
        .unwrap_or(false)
}

/// Filter chain of a stream; empty when unfiltered, `None` when malformed
fn filter_names(dict: &Dictionary) -> Option<Vec<&[u8]>> {
    match dict.get(b"Filter") {
        Err(_) => Some(Vec::new()),
        Ok(Object::Name(name)) => Some(vec![name.as_slice()]),
        Ok(Object::Array(filters)) => filters
            .iter()
            .map(|filter| filter.as_name().ok())
            .collect(),
        Ok(_) => None,
    }
}

/// Channels of a `DeviceRGB`/`DeviceGray` or 3/1-component `ICCBased` space
fn image_channels(doc: &Document, color_space: &Object) -> Option<Channels> {
    let (_, color_space) = doc.dereference(color_space).ok()?;
    match color_space {
        Object::Name(name) => match name.as_slice() {
            b"DeviceRGB" => Some(Channels::Rgb),
            b"DeviceGray" => Some(Channels::Gray),
            _ => None,
        },
        Object::Array(items) if items.len() == 2 && items[0].as_name().ok() == Some(b"ICCBased".as_slice()) => {
            let (_, profile) = doc.dereference(&items[1]).ok()?;
            match profile.as_stream().ok()?.dict.get(b"N").and_then(Object::as_i64).ok()? {
                3 => Some(Channels::Rgb),
                1 => Some(Channels::Gray),
                _ => None,
            }
        }
        _ => None,
    }
}

fn dimension(dict: &Dictionary, key: &[u8]) -> Option<u32> {
    dict.get(key)
        .and_then(Object::as_i64)
        .ok()
        .and_then(|value| u32::try_from(value).ok())
        .filter(|value| *value > 0)
}

/// Describes an image that can be re-encoded as JPEG, `None` for anything else
fn raster_image(doc: &Document, dict: &Dictionary) -> Option<RasterImage> {
    if dict.get(b"BitsPerComponent").and_then(Object::as_i64).ok() != Some(8) {
        return None;
    }
    // Stencil and colour-key masks need exact sample values
    if matches!(dict.get(b"ImageMask"), Ok(Object::Boolean(true)))
        || matches!(dict.get(b"Mask"), Ok(Object::Array(_)))
    {
        return None;
    }

    let channels = image_channels(doc, dict.get(b"ColorSpace").ok()?)?;
    let filters = filter_names(dict)?;
    let storage = if filters == [b"DCTDecode".as_slice()] {
        Storage::Jpeg
    } else if filters
        .iter()
        .all(|filter| *filter == b"FlateDecode" || *filter == b"LZWDecode")
    {
        Storage::Samples
    } else {
        return None;
    };

    Some(RasterImage {
        storage,
        channels,
        width: dimension(dict, b"Width")?,
        height: dimension(dict, b"Height")?,
    })
}

/// Decoded samples of an image stored as raw or Flate/LZW data
fn image_samples(stream: &Stream) -> lopdf::Result<Vec<u8>> {
    if !stream.dict.has(b"Filter") {
        return Ok(stream.content.clone());
    }
    // lopdf refuses to decode streams tagged as images
    let mut plain = stream.clone();
    plain.dict.remove(b"Subtype");
    plain.decompressed_content()
}

fn reencode_image(stream: &Stream, raster: RasterImage, quality: u8) -> Result<Vec<u8>, OptimizeError> {
    let image_error = |e: image::ImageError| OptimizeError::Transform(e.to_string());

    let (pixels, width, height) = match raster.storage {
        Storage::Jpeg => {
            let decoded = image::load_from_memory_with_format(&stream.content, ImageFormat::Jpeg)
                .map_err(image_error)?;
            let (width, height) = (decoded.width(), decoded.height());
            let pixels = match raster.channels {
                Channels::Rgb => decoded.to_rgb8().into_raw(),
                Channels::Gray => decoded.to_luma8().into_raw(),
            };
            (pixels, width, height)
        }
        Storage::Samples => {
            let pixels = image_samples(stream)?;
            let expected = (raster.width as usize)
                .checked_mul(raster.height as usize)
                .and_then(|n| n.checked_mul(raster.channels.count()));
            if expected != Some(pixels.len()) {
                return Err(OptimizeError::Transform(format!(
                    "{} sample bytes for a {}x{} image",
                    pixels.len(),
                    raster.width,
                    raster.height
                )));
            }
            (pixels, raster.width, raster.height)
        }
    };

    let mut output = Vec::new();
    JpegEncoder::new_with_quality(&mut output, quality)
        .encode(&pixels, width, height, raster.channels.color_type())
        .map_err(image_error)?;
    Ok(output)
}

/// Rewrites each content stream of a page from its parsed operations and
/// Flate-compresses it. Streams with filters lopdf cannot decode are left alone.
fn compact_page_contents(doc: &mut Document, page_id: ObjectId) -> usize {
    let mut compacted = 0;

    for content_id in doc.get_page_contents(page_id) {
        let Ok(stream) = doc.get_object_mut(content_id).and_then(|o| o.as_stream_mut()) else {
            continue;
        };

        let plain = if stream.dict.has(b"Filter") {
            match stream.decompressed_content() {
                Ok(data) => data,
                Err(_) => continue,
            }
        } else {
            stream.content.clone()
        };

        let encoded = Content::decode(&plain)
            .and_then(|content| content.encode())
            .unwrap_or(plain);

        stream.set_plain_content(encoded);
        // Leaves the stream uncompressed when deflate does not pay off.
        let _ = stream.compress();
        compacted += 1;
    }

    compacted
}

/// Page tree nodes stay distinct even when their dictionaries coincide
fn is_mergeable(object: &Object) -> bool {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return true,
    };
    !["Page", "Pages", "Catalog"]
        .iter()
        .any(|kind| name_is(dict, b"Type", kind.as_bytes()))
}

fn hash_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn hash_dictionary(hasher: &mut Sha256, dict: &Dictionary) {
    hasher.update(b"<<");
    hasher.update((dict.len() as u64).to_le_bytes());
    for (key, value) in dict.iter() {
        hash_bytes(hasher, key);
        hash_object(hasher, value);
    }
}

/// Canonical, type-tagged encoding of an object fed into the hasher
fn hash_object(hasher: &mut Sha256, object: &Object) {
    match object {
        Object::Null => hasher.update(b"n"),
        Object::Boolean(value) => hasher.update(if *value { b"t" } else { b"f" }),
        Object::Integer(value) => {
            hasher.update(b"i");
            hasher.update(value.to_le_bytes());
        }
        Object::Real(value) => {
            hasher.update(b"r");
            hash_bytes(hasher, value.to_string().as_bytes());
        }
        Object::Name(name) => {
            hasher.update(b"/");
            hash_bytes(hasher, name);
        }
        Object::String(bytes, _) => {
            hasher.update(b"s");
            hash_bytes(hasher, bytes);
        }
        Object::Array(items) => {
            hasher.update(b"[");
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                hash_object(hasher, item);
            }
        }
        Object::Dictionary(dict) => hash_dictionary(hasher, dict),
        Object::Stream(stream) => {
            hasher.update(b"S");
            hash_dictionary(hasher, &stream.dict);
            hash_bytes(hasher, &stream.content);
        }
        Object::Reference((number, generation)) => {
            hasher.update(b"R");
            hasher.update(number.to_le_bytes());
            hasher.update(generation.to_le_bytes());
        }
    }
}

fn object_digest(object: &Object) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hash_object(&mut hasher, object);
    hasher.finalize().into()
}

/// Maps every duplicate object to the lowest-numbered identical object
fn find_duplicates(doc: &Document) -> HashMap<ObjectId, ObjectId> {
    let mut canonical: HashMap<[u8; 32], ObjectId> = HashMap::new();
    let mut merged = HashMap::new();

    for (id, object) in doc.objects.iter().filter(|(_, o)| is_mergeable(o)) {
        let digest = object_digest(object);
        match canonical.get(&digest) {
            Some(target) => {
                debug!(
                    "Object {:?} duplicates {:?} ({})",
                    id,
                    target,
                    hex::encode(&digest[..8])
                );
                merged.insert(*id, *target);
            }
            None => {
                canonical.insert(digest, *id);
            }
        }
    }

    merged
}

fn remap_dictionary(dict: &mut Dictionary, merged: &HashMap<ObjectId, ObjectId>) {
    for (_, value) in dict.iter_mut() {
        remap_references(value, merged);
    }
}

fn remap_references(object: &mut Object, merged: &HashMap<ObjectId, ObjectId>) {
    match object {
        Object::Reference(id) => {
            if let Some(target) = merged.get(id) {
                *id = *target;
            }
        }
        Object::Array(items) => {
            for item in items.iter_mut() {
                remap_references(item, merged);
            }
        }
        Object::Dictionary(dict) => remap_dictionary(dict, merged),
        Object::Stream(stream) => remap_dictionary(&mut stream.dict, merged),
        _ => {}
    }
}

/// Merges byte-identical objects across the whole document.
///
/// Returns the number of objects removed.
fn merge_identical_objects(doc: &mut Document) -> usize {
    let mut total = 0;

    for _ in 0..MAX_MERGE_PASSES {
        let merged = find_duplicates(doc);
        if merged.is_empty() {
            break;
        }

        for object in doc.objects.values_mut() {
            remap_references(object, &merged);
        }
        remap_dictionary(&mut doc.trailer, &merged);

        for id in merged.keys() {
            doc.objects.remove(id);
        }
        total += merged.len();
    }

    total
}
