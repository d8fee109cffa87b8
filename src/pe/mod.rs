//! Bounds-checked PE structural parsing.
//!
//! [`PeImage::parse`] validates the DOS/NT/optional headers, then eagerly
//! walks the section table, resolves the entry-point section, and parses the
//! import directory, accumulating suspicion flags along the way. The result
//! is immutable: every getter returns state computed exactly once at load,
//! and the flag set can only ever have grown during that load.

pub mod binary;
pub mod entropy;
pub mod flags;
pub mod headers;
pub mod imports;

pub use binary::BinaryImage;
pub use flags::SuspicionFlags;
pub use headers::{DataDirectory, HeaderInfo, SectionRecord};
pub use imports::ModuleImport;

use crate::core::error::{Error, Result};
use crate::pe::entropy::{shannon_entropy, ENTROPY_EMPTY, ENTROPY_OUT_OF_BOUNDS};
use std::path::Path;

/// A parsed PE file: the owned byte buffer plus the structure derived from
/// it. Either fully usable (header validation succeeded) or never
/// constructed.
#[derive(Debug)]
pub struct PeImage {
    image: BinaryImage,
    header: HeaderInfo,
    sections: Vec<SectionRecord>,
    exec_section: Option<usize>,
    imports: Vec<ModuleImport>,
    import_by_ordinal: bool,
    flags: SuspicionFlags,
}

impl PeImage {
    /// Read a file and parse it as a PE.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
        Self::parse(data)
    }

    /// Parse a loaded buffer as a PE. `Error::NotPe` when the buffer is not
    /// a PE at all; structural damage past the headers never fails, it
    /// raises suspicion flags and degrades the affected data instead.
    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let image = BinaryImage::new(data);
        let header = headers::parse_headers(&image)?;

        let mut flags = SuspicionFlags::new();
        let sections = headers::parse_sections(&image, &header, &mut flags);

        let exec_section = sections
            .iter()
            .position(|s| s.contains_rva_virtual(header.entry_point));
        if let Some(index) = exec_section {
            let name = sections[index].name();
            if name != ".text" && name != "CODE" {
                flags.insert(SuspicionFlags::EXEC_SECTION_NOT_TEXT);
            }
        }

        let (imports, import_by_ordinal) =
            imports::parse_imports(&image, &header, &sections, &mut flags);

        Ok(Self {
            image,
            header,
            sections,
            exec_section,
            imports,
            import_by_ordinal,
            flags,
        })
    }

    /// The raw file bytes.
    pub fn data(&self) -> &[u8] {
        self.image.data()
    }

    /// Size of the file on disk.
    pub fn file_size(&self) -> usize {
        self.image.len()
    }

    /// Parsed header fields.
    pub fn header(&self) -> &HeaderInfo {
        &self.header
    }

    /// `AddressOfEntryPoint` RVA.
    pub fn entry_point_rva(&self) -> u32 {
        self.header.entry_point
    }

    /// `FileAlignment` from the optional header.
    pub fn file_alignment(&self) -> u32 {
        self.header.file_alignment
    }

    /// `SizeOfHeaders` from the optional header.
    pub fn size_of_headers(&self) -> u32 {
        self.header.size_of_headers
    }

    /// Whether the image uses the PE32+ (64-bit) layout.
    pub fn is_pe64(&self) -> bool {
        self.header.is_pe64
    }

    /// Whether the DLL bit is set in the COFF characteristics.
    pub fn is_dll(&self) -> bool {
        self.header.characteristics & headers::IMAGE_FILE_DLL != 0
    }

    /// The section table, in file order.
    pub fn sections(&self) -> &[SectionRecord] {
        &self.sections
    }

    /// The first section-table record.
    pub fn first_section(&self) -> Option<&SectionRecord> {
        self.sections.first()
    }

    /// First section (table order) containing `rva`.
    pub fn section_at(&self, rva: u32) -> Option<&SectionRecord> {
        headers::section_containing(&self.sections, rva)
    }

    /// The section the entry point falls in, if any. An entry point in the
    /// header region (or pointing nowhere) has no section; the scan engine
    /// treats that case separately.
    pub fn exec_section(&self) -> Option<&SectionRecord> {
        self.exec_section.map(|i| &self.sections[i])
    }

    /// Translate an RVA to a file offset; `None` when the RVA does not map
    /// to bytes physically present in the file.
    pub fn offset_from_rva(&self, rva: u32) -> Option<usize> {
        headers::rva_to_offset(&self.sections, self.image.len(), rva)
    }

    /// Imported modules, in descriptor order.
    pub fn imports(&self) -> &[ModuleImport] {
        &self.imports
    }

    /// Whether any import is by ordinal rather than by name.
    pub fn import_by_ordinal(&self) -> bool {
        self.import_by_ordinal
    }

    /// The suspicion flags raised while parsing.
    pub fn flags(&self) -> SuspicionFlags {
        self.flags
    }

    /// Shannon entropy of the whole file.
    pub fn file_entropy(&self) -> f64 {
        shannon_entropy(self.image.data())
    }

    /// Shannon entropy of a section's raw data. `ENTROPY_OUT_OF_BOUNDS` when
    /// the raw range leaves the file (the matching `SECTION_OUT_OF_BOUND`
    /// flag was already raised at parse time), `ENTROPY_EMPTY` when the
    /// section has no raw data.
    pub fn section_entropy(&self, section: &SectionRecord) -> f64 {
        let file_size = self.image.len() as u64;
        let pointer = u64::from(section.pointer_to_raw_data);
        let raw_size = u64::from(section.size_of_raw_data);

        if pointer > file_size || raw_size > file_size || pointer + raw_size > file_size {
            return ENTROPY_OUT_OF_BOUNDS;
        }
        if raw_size == 0 {
            return ENTROPY_EMPTY;
        }

        match self.image.slice(pointer as usize, raw_size as usize) {
            Some(region) => shannon_entropy(region),
            None => ENTROPY_OUT_OF_BOUNDS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pe::entropy::ENTROPY_NO_DATA;
    use crate::testutil::{le32, TestPe, TestSection};

    #[test]
    fn test_not_mz_is_rejected() {
        let mut data = TestPe::pe32().build();
        data[0] = b'X';
        assert!(matches!(PeImage::parse(data), Err(Error::NotPe)));

        assert!(matches!(
            PeImage::parse(b"short".to_vec()),
            Err(Error::NotPe)
        ));
    }

    #[test]
    fn test_e_lfanew_past_file_is_rejected() {
        let mut data = TestPe::pe32().build();
        let len = data.len() as u32;
        le32(&mut data, 0x3C, len);
        assert!(matches!(PeImage::parse(data), Err(Error::NotPe)));
    }

    #[test]
    fn test_bad_nt_signature_is_rejected() {
        let mut data = TestPe::pe32().build();
        data[0x80] = b'X';
        assert!(matches!(PeImage::parse(data), Err(Error::NotPe)));
    }

    #[test]
    fn test_unknown_optional_magic_is_rejected() {
        let mut data = TestPe::pe32().build();
        // optional header magic lives 24 bytes past the NT signature
        data[0x98] = 0x0C;
        assert!(matches!(PeImage::parse(data), Err(Error::NotPe)));
    }

    #[test]
    fn test_minimal_pe32_parses() {
        let pe = PeImage::parse(TestPe::pe32().build()).unwrap();
        assert!(!pe.is_pe64());
        assert!(!pe.is_dll());
        assert_eq!(pe.entry_point_rva(), 0x1000);
        assert_eq!(pe.file_alignment(), 0x200);
        assert_eq!(pe.sections().len(), 1);
        assert_eq!(pe.exec_section().unwrap().name(), ".text");
        assert!(!pe.flags().contains(SuspicionFlags::EXEC_SECTION_NOT_TEXT));
        // no import directory at all
        assert!(pe.flags().contains(SuspicionFlags::NO_IMPORTS));
    }

    #[test]
    fn test_minimal_pe64_parses() {
        let pe = PeImage::parse(TestPe::pe64().build()).unwrap();
        assert!(pe.is_pe64());
        assert_eq!(pe.entry_point_rva(), 0x1000);
        assert_eq!(pe.exec_section().unwrap().name(), ".text");
    }

    #[test]
    fn test_dll_bit() {
        let mut spec = TestPe::pe32();
        spec.characteristics |= 0x2000;
        let pe = PeImage::parse(spec.build()).unwrap();
        assert!(pe.is_dll());
    }

    #[test]
    fn test_exec_section_with_packer_name_is_flagged() {
        let mut spec = TestPe::pe32();
        spec.sections[0].name = "UPX1";
        let pe = PeImage::parse(spec.build()).unwrap();
        assert_eq!(pe.exec_section().unwrap().name(), "UPX1");
        assert!(pe.flags().contains(SuspicionFlags::EXEC_SECTION_NOT_TEXT));
    }

    #[test]
    fn test_code_section_name_is_not_flagged() {
        let mut spec = TestPe::pe32();
        spec.sections[0].name = "CODE";
        let pe = PeImage::parse(spec.build()).unwrap();
        assert!(!pe.flags().contains(SuspicionFlags::EXEC_SECTION_NOT_TEXT));
    }

    #[test]
    fn test_entry_point_in_header_region() {
        let mut spec = TestPe::pe32();
        spec.entry_point = 0x40;
        let pe = PeImage::parse(spec.build()).unwrap();
        assert!(pe.exec_section().is_none());
    }

    #[test]
    fn test_section_raw_extent_past_file_is_flagged() {
        let mut data = TestPe::pe32().build();
        // cut the file short of the .text raw extent
        data.truncate(0x300);
        let pe = PeImage::parse(data).unwrap();
        assert!(pe.flags().contains(SuspicionFlags::SECTION_OUT_OF_BOUND));

        let section = pe.sections()[0].clone();
        assert_eq!(pe.section_entropy(&section), ENTROPY_OUT_OF_BOUNDS);
    }

    #[test]
    fn test_section_table_truncated_keeps_partial_list() {
        let mut data = TestPe::pe32().build();
        // claim more sections than the buffer holds records for
        let coff = 0x84;
        data[coff + 2] = 200;
        let pe = PeImage::parse(data).unwrap();
        assert!(pe.sections().len() < 200);
        assert!(pe.flags().contains(SuspicionFlags::SECTION_OUT_OF_BOUND));
    }

    #[test]
    fn test_entropy_values() {
        let mut spec = TestPe::pe32();
        spec.sections[0].data = vec![0xCC; 0x200];
        let pe = PeImage::parse(spec.build()).unwrap();

        let section = pe.sections()[0].clone();
        assert_eq!(pe.section_entropy(&section), 0.0);
        assert!(pe.file_entropy() > 0.0);
        assert_ne!(pe.file_entropy(), ENTROPY_NO_DATA);
    }

    #[test]
    fn test_zero_length_section_entropy() {
        let mut spec = TestPe::pe32();
        spec.sections.push(TestSection {
            name: ".bss",
            virtual_address: 0x2000,
            virtual_size: 0x100,
            pointer_to_raw_data: 0,
            size_of_raw_data: 0,
            data: Vec::new(),
        });
        let pe = PeImage::parse(spec.build()).unwrap();
        let section = pe.sections()[1].clone();
        assert_eq!(pe.section_entropy(&section), ENTROPY_EMPTY);
    }

    #[test]
    fn test_getters_are_stable() {
        let pe = PeImage::parse(TestPe::pe32().build()).unwrap();
        assert_eq!(pe.sections(), pe.sections());
        assert_eq!(pe.exec_section(), pe.exec_section());
        assert_eq!(pe.flags(), pe.flags());
        assert_eq!(pe.offset_from_rva(0x1010), pe.offset_from_rva(0x1010));
        assert_eq!(pe.offset_from_rva(0x1010), Some(0x210));
        assert_eq!(pe.first_section(), pe.exec_section());
        assert_eq!(pe.section_at(0x1010), pe.exec_section());
    }
}
