//! Memory region bookkeeping.
//!
//! Used to answer "is this whole range mapped?" before a write is attempted.
//! On Linux the regions come from `/proc/self/maps`.

/// A mapped range of the address space
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: usize,
    pub end: usize,
    pub perms: String,
    pub offset: usize,
    pub path: Option<String>,
}

impl MemoryRegion {
    pub fn new(start: usize, end: usize, perms: &str) -> Self {
        Self {
            start,
            end,
            perms: perms.to_string(),
            offset: 0,
            path: None,
        }
    }

    pub fn size(&self) -> usize {
        self.end - self.start
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address < self.end
    }

    pub fn is_readable(&self) -> bool {
        self.perms.starts_with('r')
    }

    pub fn is_writable(&self) -> bool {
        self.perms.chars().nth(1) == Some('w')
    }

    pub fn is_executable(&self) -> bool {
        self.perms.chars().nth(2) == Some('x')
    }

    /// Guard pages and reserved ranges carry no permissions at all
    pub fn is_accessible(&self) -> bool {
        self.is_readable() || self.is_writable() || self.is_executable()
    }
}

/// Parse one line of a `/proc/<pid>/maps` listing.
///
/// Format: `start-end perms offset dev inode [path]`
pub fn parse_maps_line(line: &str) -> Option<MemoryRegion> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let (start, end) = parts.first()?.split_once('-')?;
    let start = usize::from_str_radix(start, 16).ok()?;
    let end = usize::from_str_radix(end, 16).ok()?;
    if end <= start {
        return None;
    }

    let perms = parts.get(1)?.to_string();
    let offset = parts
        .get(2)
        .and_then(|s| usize::from_str_radix(s, 16).ok())
        .unwrap_or(0);
    let path = parts.get(5..).filter(|p| !p.is_empty()).map(|p| p.join(" "));

    Some(MemoryRegion {
        start,
        end,
        perms,
        offset,
        path,
    })
}

/// Parse a full maps listing, skipping malformed lines
pub fn parse_maps(contents: &str) -> Vec<MemoryRegion> {
    contents.lines().filter_map(parse_maps_line).collect()
}

/// Whether `address..address + len` is fully covered by accessible regions.
///
/// Adjacent regions are allowed to split the range.
pub fn covers(regions: &[MemoryRegion], address: usize, len: usize) -> bool {
    let Some(end) = address.checked_add(len) else {
        return false;
    };

    let mut cursor = address;
    while cursor < end {
        match regions
            .iter()
            .find(|r| r.contains(cursor) && r.is_accessible())
        {
            Some(region) => cursor = region.end,
            None => return false,
        }
    }
    true
}
