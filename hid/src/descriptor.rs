//! HID descriptor data types.

#![allow(clippy::unusual_byte_groupings)] // For num_enum::TryFromPrimitive

use alloc::collections::BTreeSet;
use alloc::vec::Vec;
use core::fmt;
use core::iter::FusedIterator;

use crate::{ReportRef, ReportType};

/// An encoded HID report descriptor (\[HID\] Section 5.2, 6.2.2).
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ReportDescriptor(Vec<u8>);

impl ReportDescriptor {
    /// Creates a new report descriptor.
    #[inline]
    pub fn new(items: impl AsRef<[Item]>) -> Self {
        fn bytes(items: &[Item]) -> usize {
            items.iter().fold(0, |n, v| match *v {
                Item::MCollection(_, ref v) => n + 4 + bytes(v),
                _ => n + 3,
            })
        }
        let items = items.as_ref();
        let mut this = Self(Vec::with_capacity(bytes(items)));
        this.extend(items);
        this
    }

    /// Wraps raw descriptor bytes without validation.
    #[inline(always)]
    #[must_use]
    pub fn from_bytes(v: impl Into<Vec<u8>>) -> Self {
        Self(v.into())
    }

    /// Combines per-class descriptors into one report map shared by a single
    /// HID service. Each part must consist of balanced top-level Application
    /// collections that declare a Report ID before their first main data item,
    /// and report IDs must be unique across all parts.
    pub fn composite<'a>(
        parts: impl IntoIterator<Item = &'a Self>,
    ) -> Result<Self, DescriptorError> {
        let mut ids = BTreeSet::new();
        let mut this = Self::default();
        for part in parts {
            for id in part.validate()? {
                if !ids.insert(id) {
                    return Err(DescriptorError::DuplicateReportId(id));
                }
            }
            this.append(part);
        }
        Ok(this)
    }

    /// Appends the contents of another report descriptor to this one.
    #[inline]
    pub fn append(&mut self, other: &Self) {
        self.0.extend_from_slice(&other.0);
    }

    /// Appends all `items` to the report descriptor.
    #[inline]
    pub fn extend(&mut self, items: impl AsRef<[Item]>) {
        for v in items.as_ref() {
            self.push(v);
        }
    }

    /// Returns an iterator over report descriptor items.
    #[inline(always)]
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter(&self.0)
    }

    /// Returns the distinct reports declared by the descriptor in declaration
    /// order.
    #[must_use]
    pub fn reports(&self) -> Vec<ReportRef> {
        let mut id = 0;
        let mut out: Vec<ReportRef> = Vec::new();
        for (t, _, v) in self {
            let typ = match t {
                Tag::ReportId => {
                    id = u8::try_from(v).unwrap_or_default();
                    continue;
                }
                Tag::Input => ReportType::Input,
                Tag::Output => ReportType::Output,
                Tag::Feature => ReportType::Feature,
                _ => continue,
            };
            let r = ReportRef { id, typ };
            if !out.contains(&r) {
                out.push(r);
            }
        }
        out
    }

    /// Checks collection structure and returns the report IDs declared by
    /// each top-level collection.
    pub fn validate(&self) -> Result<Vec<u8>, DescriptorError> {
        let (mut depth, mut ids, mut cur) = (0_usize, Vec::new(), None);
        let mut n = 0;
        for (t, _, v) in self {
            n += 1;
            match t {
                Tag::Collection => {
                    if depth == 0 {
                        if v != Collection::Application as u32 {
                            return Err(DescriptorError::NotApplication);
                        }
                        cur = None;
                    }
                    depth += 1;
                }
                Tag::EndCollection => {
                    depth = (depth.checked_sub(1)).ok_or(DescriptorError::Unbalanced)?;
                    if depth == 0 {
                        ids.push(cur.ok_or(DescriptorError::MissingReportId)?);
                    }
                }
                Tag::ReportId => match u8::try_from(v) {
                    Ok(id) if id != 0 => cur = Some(id),
                    _ => return Err(DescriptorError::InvalidReportId(v)),
                },
                Tag::Input | Tag::Output | Tag::Feature if cur.is_none() => {
                    return Err(DescriptorError::MissingReportId);
                }
                Tag::Pop | Tag::Push | Tag::Long => return Err(DescriptorError::Unsupported(t)),
                _ => {}
            }
        }
        if depth != 0 || self.0.len() != self.iter().byte_len(n) {
            return Err(DescriptorError::Unbalanced);
        }
        Ok(ids)
    }

    /// Appends item `v` to the descriptor.
    fn push(&mut self, v: &Item) {
        use {Item::*, Tag::*};
        match *v {
            // Main
            MInput(v) => self.u32(Input, u32::from(v.bits())),
            MOutput(v) => self.u32(Output, u32::from(v.bits())),
            MCollection(typ, ref v) => {
                self.u32(Collection, typ as _);
                self.extend(v);
                self.0.push(EndCollection as _);
            }

            // Global
            GUsagePage(v) => self.u32(UsagePage, v as _),
            GLogicalMin(v) => self.i32(LogicalMin, v),
            GLogicalMax(v) => self.i32(LogicalMax, v),
            GReportSize(v) => self.u32(ReportSize, v),
            GReportId(v) => {
                if v != 0 {
                    self.u32(ReportId, u32::from(v));
                }
            }
            GReportCount(v) => self.u32(ReportCount, v),

            // Local
            LUsage(v) => self.u32(Usage, v),
            LUsageMin(v) => self.u32(UsageMin, v),
            LUsageMax(v) => self.u32(UsageMax, v),
        }
    }

    /// Appends a short `i32` item.
    fn i32(&mut self, t: Tag, v: i32) {
        #[allow(clippy::cast_possible_truncation)]
        let n = (usize::from(i32::from(v as i16) != v) * 2)
            + (usize::from(i32::from(v as i8) != v) + 1);
        self.put(t, v.to_le_bytes(), n);
    }

    /// Appends a short `u32` item.
    fn u32(&mut self, t: Tag, v: u32) {
        #[allow(clippy::cast_possible_truncation)]
        let n = (usize::from(u32::from(v as u16) != v) * 2)
            + (usize::from(u32::from(v as u8) != v) + 1);
        self.put(t, v.to_le_bytes(), n);
    }

    /// Appends `n` bytes of a short value. Windows does not handle some
    /// zero-size items correctly, so `n` must be 1, 2, or 4.
    #[inline]
    fn put(&mut self, t: Tag, v: [u8; 4], n: usize) {
        #[allow(clippy::cast_possible_truncation)]
        let hdr = t as u8 | (n.trailing_zeros() as u8 + 1);
        self.0.push(hdr);
        self.0.extend_from_slice(&v[..n]);
    }
}

impl AsRef<[u8]> for ReportDescriptor {
    #[inline(always)]
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl<'a> IntoIterator for &'a ReportDescriptor {
    type Item = <Iter<'a> as Iterator>::Item;
    type IntoIter = Iter<'a>;

    #[inline(always)]
    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Report descriptor validation error.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[non_exhaustive]
pub enum DescriptorError {
    /// Collection and End Collection items do not match or the descriptor is
    /// truncated.
    Unbalanced,
    /// A top-level collection is not an Application collection.
    NotApplication,
    /// A top-level collection has data items but no Report ID.
    MissingReportId,
    /// Report ID is zero or does not fit in one byte.
    InvalidReportId(u32),
    /// The same Report ID is used by more than one collection.
    DuplicateReportId(u8),
    /// The item is not supported in a composite report map.
    Unsupported(Tag),
}

impl fmt::Display for DescriptorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unbalanced => f.write_str("unbalanced or truncated report descriptor"),
            Self::NotApplication => f.write_str("top-level collection is not an application"),
            Self::MissingReportId => f.write_str("application collection without a report ID"),
            Self::InvalidReportId(v) => write!(f, "invalid report ID {v}"),
            Self::DuplicateReportId(id) => write!(f, "duplicate report ID {id}"),
            Self::Unsupported(t) => write!(f, "unsupported item {t:?}"),
        }
    }
}

/// Report descriptor iterator. Yields `(tag, size, data)` values. For short
/// items, `size` is the number of bytes used for `data`. For long items, `size`
/// is `bDataSize`, `data` is `bLongItemTag`, and the actual data is skipped.
#[derive(Clone, Debug)]
pub struct Iter<'a>(&'a [u8]);

impl Iter<'_> {
    /// Returns the number of bytes occupied by the first `n` items.
    fn byte_len(mut self, n: usize) -> usize {
        let total = self.0.len();
        for _ in 0..n {
            if self.next().is_none() {
                break;
            }
        }
        total - self.0.len()
    }
}

impl Iterator for Iter<'_> {
    type Item = (Tag, usize, u32);

    fn next(&mut self) -> Option<Self::Item> {
        use num_enum::TryFromPrimitive;
        let (&t, tail) = self.0.split_first()?;
        let n = 4 >> (3 - (t & 3));
        let t = Tag::try_from_primitive(t & !3).ok()?;
        if n > tail.len() {
            return None;
        }
        let mut v = [0_u8; 4];
        let (data, tail) = tail.split_at(n);
        v[..n].copy_from_slice(data);
        if !matches!(t, Tag::Long) {
            self.0 = tail;
            return Some((t, n, u32::from_le_bytes(v)));
        }
        let sz = usize::from(v[0]);
        if n != 2 || sz > tail.len() {
            return None;
        }
        self.0 = &tail[sz..];
        Some((t, sz, u32::from(v[1])))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.0.len()))
    }
}

impl FusedIterator for Iter<'_> {}

/// Report descriptor item (\[HID\] Section 5.2, 6.2.2).
///
/// Variants are prefixed with `M`, `G`, or `L` for Main, Global, or Local type,
/// respectively. Local items only describe the data fields defined by the next
/// Main item. Global items become the default attributes for all subsequent
/// data fields.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Item {
    /// Data from one or more similar controls on a device.
    MInput(Flag),
    /// Data to one or more similar controls on a device, such as LEDs.
    MOutput(Flag),
    /// A meaningful grouping of Input, Output, and Feature items.
    MCollection(Collection, Vec<Item>),

    /// Current Usage Page, forming the high 16 bits of subsequent usages.
    GUsagePage(super::usage::Page),
    /// Minimum value that a variable or array item will report.
    GLogicalMin(i32),
    /// Maximum value that a variable or array item will report.
    GLogicalMax(i32),
    /// Size of the report fields in bits.
    GReportSize(u32),
    /// Report ID. Zero is reserved and omitted from the descriptor. Bluetooth
    /// hosts match it against the Report Reference characteristic descriptor.
    GReportId(u8),
    /// Number of fields included in the report for this item.
    GReportCount(u32),

    /// Suggested usage for the next item or collection.
    LUsage(u32),
    /// Starting usage associated with an array or bitmap.
    LUsageMin(u32),
    /// Ending usage associated with an array or bitmap.
    LUsageMax(u32),
}

/// Item tag specifying the function of the item
/// (\[HID\] Section 6.2.2.3, 6.2.2.4, 6.2.2.7, 6.2.2.8).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::TryFromPrimitive)]
#[non_exhaustive]
#[repr(u8)]
pub enum Tag {
    // Main
    Input = 0b1000_00 << 2,
    Output = 0b1001_00 << 2,
    Feature = 0b1011_00 << 2,
    Collection = 0b1010_00 << 2,
    EndCollection = 0b1100_00 << 2,

    // Global
    UsagePage = 0b0000_01 << 2,
    LogicalMin = 0b0001_01 << 2,
    LogicalMax = 0b0010_01 << 2,
    PhysicalMin = 0b0011_01 << 2,
    PhysicalMax = 0b0100_01 << 2,
    UnitExp = 0b0101_01 << 2,
    Unit = 0b0110_01 << 2,
    ReportSize = 0b0111_01 << 2,
    ReportId = 0b1000_01 << 2,
    ReportCount = 0b1001_01 << 2,
    Push = 0b1010_01 << 2,
    Pop = 0b1011_01 << 2,

    // Local
    Usage = 0b0000_10 << 2,
    UsageMin = 0b0001_10 << 2,
    UsageMax = 0b0010_10 << 2,
    DesignatorIndex = 0b0011_10 << 2,
    DesignatorMin = 0b0100_10 << 2,
    DesignatorMax = 0b0101_10 << 2,
    StringIndex = 0b0111_10 << 2,
    StringMin = 0b1000_10 << 2,
    StringMax = 0b1001_10 << 2,
    Delim = 0b1010_10 << 2,

    // Long
    Long = 0b1111_11 << 2,
}

bitflags::bitflags! {
    /// Input, Output, and Feature item data flags (\[HID\] Section 6.2.2.5).
    #[derive(Clone, Copy, Debug, Default)]
    pub struct Flag: u16 {
        /// Data / constant.
        const CONST = 1 << 0;
        /// Array / variable. Variable fields carry one control each; array
        /// fields carry the index of each asserted control.
        const VAR = 1 << 1;
        /// Absolute / relative.
        const REL = 1 << 2;
    }
}

/// Collection type (\[HID\] Section 6.2.2.6).
#[derive(Clone, Copy, Debug)]
#[non_exhaustive]
#[repr(u8)]
pub enum Collection {
    /// Data items collected at one geometric point.
    Physical = 0x00,
    /// A group of Main items familiar to applications, such as a keyboard or
    /// mouse. Each application collection in a composite map carries its own
    /// report ID.
    Application = 0x01,
}

impl Collection {
    /// Defines a physical collection.
    #[inline(always)]
    #[must_use]
    pub fn physical(items: impl AsRef<[Item]>) -> Item {
        Item::MCollection(Self::Physical, items.as_ref().to_vec())
    }

    /// Defines an application collection.
    #[inline(always)]
    #[must_use]
    pub fn application(items: impl AsRef<[Item]>) -> Item {
        Item::MCollection(Self::Application, items.as_ref().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use alloc::vec;

    use crate::usage::{GenericDesktop, Page};

    use super::*;

    fn app(id: u8) -> ReportDescriptor {
        use Item::*;
        ReportDescriptor::new([
            GUsagePage(Page::GenericDesktop),
            LUsage(GenericDesktop::Mouse as _),
            Collection::application([
                GReportId(id),
                GReportSize(8),
                GReportCount(1),
                MInput(Flag::VAR),
            ]),
        ])
    }

    #[test]
    fn encoding() {
        assert_eq!(
            app(1).as_ref(),
            &[
                0x05, 0x01, // Usage Page (Generic Desktop)
                0x09, 0x02, // Usage (Mouse)
                0xA1, 0x01, // Collection (Application)
                0x85, 0x01, //   Report ID (1)
                0x75, 0x08, //   Report Size (8)
                0x95, 0x01, //   Report Count (1)
                0x81, 0x02, //   Input (Data, Var, Abs)
                0xC0, // End Collection
            ]
        );
        let rd = ReportDescriptor::new([Item::GLogicalMin(-127), Item::GLogicalMax(255)]);
        assert_eq!(rd.as_ref(), &[0x15, 0x81, 0x26, 0xFF, 0x00]);
    }

    #[test]
    fn iter() {
        let rd = app(3);
        let tags: Vec<Tag> = rd.iter().map(|(t, _, _)| t).collect();
        assert_eq!(
            tags,
            vec![
                Tag::UsagePage,
                Tag::Usage,
                Tag::Collection,
                Tag::ReportId,
                Tag::ReportSize,
                Tag::ReportCount,
                Tag::Input,
                Tag::EndCollection,
            ]
        );
        assert_eq!(rd.reports(), vec![ReportRef::input(3)]);
    }

    #[test]
    fn composite() {
        let rd = ReportDescriptor::composite([&app(1), &app(2)]).unwrap();
        assert_eq!(rd.validate(), Ok(vec![1, 2]));
        assert_eq!(rd.reports(), vec![ReportRef::input(1), ReportRef::input(2)]);
        assert_eq!(
            ReportDescriptor::composite([&app(1), &app(1)]),
            Err(DescriptorError::DuplicateReportId(1))
        );
    }

    #[test]
    fn invalid() {
        use Item::*;
        let no_id = ReportDescriptor::new([Collection::application([
            GReportSize(8),
            MInput(Flag::VAR),
        ])]);
        assert_eq!(no_id.validate(), Err(DescriptorError::MissingReportId));

        let physical = ReportDescriptor::new([Collection::physical([GReportId(1)])]);
        assert_eq!(physical.validate(), Err(DescriptorError::NotApplication));

        let mut open = app(1).as_ref().to_vec();
        open.pop();
        assert_eq!(
            ReportDescriptor::from_bytes(open).validate(),
            Err(DescriptorError::Unbalanced)
        );
    }
}
