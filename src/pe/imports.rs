//! Import directory parsing.
//!
//! Walks the import descriptor table, module-name strings, and name/ordinal
//! thunk tables. Malformed structures never abort the walk as a whole: each
//! failed step raises a suspicion flag and keeps whatever was collected so
//! far. Only a read that would pass the end of the file stops resolution
//! outright.

use crate::pe::binary::BinaryImage;
use crate::pe::flags::SuspicionFlags;
use crate::pe::headers::{rva_to_offset, section_containing, HeaderInfo, SectionRecord};
use serde::Serialize;

const IMPORT_DESCRIPTOR_SIZE: u64 = 20;

/// Cap on a module-name scan. Mirrors the loader's path-length limit.
const MAX_IMPORT_NAME: usize = 260;
/// Cap on an API-name scan. The loader truncates here too, so the truncated
/// name is what would actually be looked up — it is reproduced, not just
/// flagged.
const MAX_API_NAME: usize = 256;

const ORDINAL_FLAG32: u64 = 1 << 31;
const ORDINAL_FLAG64: u64 = 1 << 63;

/// One imported module and its API names, in thunk-table order.
/// Ordinal imports render as `"Ord(<n>)"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleImport {
    pub name: String,
    pub apis: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
struct ImportDescriptor {
    characteristics: u32,
    name: u32,
    first_thunk: u32,
}

fn read_descriptor(image: &BinaryImage, offset: usize) -> Option<ImportDescriptor> {
    Some(ImportDescriptor {
        characteristics: image.read_u32_le(offset)?,
        name: image.read_u32_le(offset + 12)?,
        first_thunk: image.read_u32_le(offset + 16)?,
    })
}

/// Some Borland-compiled files leave `Characteristics` zero; `FirstThunk`
/// stands in for it then. (`FirstThunk` alone is not usable in general:
/// optimized system DLLs store absolute addresses there.)
fn normalize_descriptor(descriptor: &mut ImportDescriptor) {
    if descriptor.characteristics as i32 <= 0 && descriptor.first_thunk != 0 {
        descriptor.characteristics = descriptor.first_thunk;
    }
}

/// Scan a NUL-terminated name at `offset`, capped at `cap` bytes and at the
/// end of the file. Returns the (possibly truncated) name and whether a
/// terminator was found inside both limits.
fn read_bounded_name(data: &[u8], offset: usize, cap: usize) -> (String, bool) {
    let len = data.len();
    let mut i = offset;
    while i < len && data[i] != 0 && i - offset < cap {
        i += 1;
    }
    let terminated = i < len && i - offset < cap;
    let name = if offset <= len {
        String::from_utf8_lossy(&data[offset..i]).into_owned()
    } else {
        String::new()
    };
    (name, terminated)
}

/// Walk the import directory. Returns the imported modules and whether any
/// import is by ordinal.
pub(crate) fn parse_imports(
    image: &BinaryImage,
    header: &HeaderInfo,
    sections: &[SectionRecord],
    flags: &mut SuspicionFlags,
) -> (Vec<ModuleImport>, bool) {
    let mut modules = Vec::new();
    let mut by_ordinal = false;
    let file_size = image.len() as u64;
    let directory = header.import_directory;

    if directory.rva == 0 && directory.size == 0 {
        flags.insert(SuspicionFlags::NO_IMPORTS);
        return (modules, by_ordinal);
    }
    if directory.rva == 0 || directory.size == 0 {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return (modules, by_ordinal);
    }
    if u64::from(directory.size) > file_size {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return (modules, by_ordinal);
    }

    // the section the directory lives in must be able to hold it, on disk
    let Some(directory_section) = section_containing(sections, directory.rva) else {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return (modules, by_ordinal);
    };
    let raw_start = u64::from(directory_section.pointer_to_raw_data);
    let raw_end = raw_start + u64::from(directory_section.size_of_raw_data);
    if directory_section.size_of_raw_data < directory.size || raw_end > file_size {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return (modules, by_ordinal);
    }

    let mut descriptor_offset =
        u64::from(directory.rva) - u64::from(directory_section.virtual_address) + raw_start;
    if descriptor_offset < raw_start || descriptor_offset > raw_end {
        flags.insert(SuspicionFlags::SUSPICIOUS_IMPORTS);
    }
    if descriptor_offset + IMPORT_DESCRIPTOR_SIZE > file_size {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return (modules, by_ordinal);
    }

    let mut descriptor = match read_descriptor(image, descriptor_offset as usize) {
        Some(d) => d,
        None => {
            flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
            return (modules, by_ordinal);
        }
    };
    normalize_descriptor(&mut descriptor);
    if descriptor.name == 0 || descriptor.characteristics as i32 <= 0 {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return (modules, by_ordinal);
    }

    while descriptor.name != 0 && descriptor.first_thunk != 0 {
        let name_rva = u64::from(descriptor.name);
        let section_start = u64::from(directory_section.virtual_address);
        if name_rva < section_start
            || name_rva > section_start + u64::from(directory_section.size_of_raw_data)
        {
            flags.insert(SuspicionFlags::SUSPICIOUS_IMPORTS);
        }

        let mut module_name = String::new();
        match rva_to_offset(sections, image.len(), descriptor.name) {
            None => flags.insert(SuspicionFlags::CORRUPTED_IMPORTS),
            Some(offset) => {
                // a name running into the end of the file is still loadable
                // up to that point; take what is there and flag it
                let (name, terminated) = read_bounded_name(image.data(), offset, MAX_IMPORT_NAME);
                if !terminated {
                    flags.insert(SuspicionFlags::SUSPICIOUS_IMPORTS);
                }
                module_name = name;
            }
        }

        let mut apis = Vec::new();
        if module_name.is_empty() {
            flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        } else {
            let thunk_offset = i64::from(descriptor.characteristics)
                - i64::from(directory_section.virtual_address)
                + raw_start as i64;
            apis = walk_thunks(
                image,
                sections,
                directory_section,
                thunk_offset,
                header.is_pe64,
                flags,
                &mut by_ordinal,
            );
        }

        modules.push(ModuleImport {
            name: module_name,
            apis,
        });

        descriptor_offset += IMPORT_DESCRIPTOR_SIZE;
        if descriptor_offset + IMPORT_DESCRIPTOR_SIZE >= file_size {
            break;
        }
        descriptor = match read_descriptor(image, descriptor_offset as usize) {
            Some(d) => d,
            None => break,
        };
        normalize_descriptor(&mut descriptor);
    }

    (modules, by_ordinal)
}

fn walk_thunks(
    image: &BinaryImage,
    sections: &[SectionRecord],
    directory_section: &SectionRecord,
    thunk_offset: i64,
    is_pe64: bool,
    flags: &mut SuspicionFlags,
    by_ordinal: &mut bool,
) -> Vec<String> {
    let mut apis = Vec::new();
    let file_size = image.len() as i64;
    let entry_size: i64 = if is_pe64 { 8 } else { 4 };

    // a thunk table outside the import directory's section usually means a
    // packed or hand-edited file
    let raw_start = i64::from(directory_section.pointer_to_raw_data);
    let raw_end = raw_start + i64::from(directory_section.size_of_raw_data);
    if thunk_offset < raw_start || thunk_offset > raw_end {
        flags.insert(SuspicionFlags::SUSPICIOUS_IMPORTS);
    }
    if thunk_offset < 0 || thunk_offset + entry_size > file_size {
        flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
        return apis;
    }

    let ordinal_flag = if is_pe64 {
        ORDINAL_FLAG64
    } else {
        ORDINAL_FLAG32
    };
    let mut offset = thunk_offset as usize;
    loop {
        let entry = if is_pe64 {
            image.read_u64_le(offset)
        } else {
            image.read_u32_le(offset).map(u64::from)
        };
        let Some(entry) = entry else {
            flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
            break;
        };
        if entry == 0 {
            break;
        }

        if entry & ordinal_flag != 0 {
            *by_ordinal = true;
            apis.push(format!("Ord({})", entry & 0xFF));
        } else {
            // name-table RVAs are 32 bits wide even in PE32+ images
            match rva_to_offset(sections, image.len(), entry as u32) {
                None => {
                    flags.insert(SuspicionFlags::CORRUPTED_IMPORTS);
                    apis.push(String::new());
                }
                Some(name_offset) => {
                    // skip the 2-byte hint preceding the name
                    let (name, terminated) =
                        read_bounded_name(image.data(), name_offset + 2, MAX_API_NAME);
                    if !terminated {
                        flags.insert(SuspicionFlags::SUSPICIOUS_IMPORTS);
                    }
                    apis.push(name);
                }
            }
        }

        offset += entry_size as usize;
    }

    apis
}
