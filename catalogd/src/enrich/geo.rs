use std::net::Ipv4Addr;
use std::path::Path;
use anyhow::{anyhow, bail, Context, Result};

/// Resolves an address to a two-letter country code.
pub trait CountryLookup: Send + Sync {
    fn lookup(&self, ip: Ipv4Addr) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Range {
    start: u32,
    end: u32,
    country: String,
}

/// IPv4 range table loaded once at startup.
///
/// One `start,end,cc` line per range, addresses as dotted quads, `#` starts
/// a comment. Ranges must not overlap. This is the layout of the DB-IP
/// "IP to Country Lite" CSV; its IPv6 rows are skipped.
#[derive(Debug, Clone, Default)]
pub struct RangeTable {
    ranges: Vec<Range>,
}

impl RangeTable {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read range table: {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("Failed to parse range table: {}", path.display()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let mut ranges = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() || line.split(',').next().is_some_and(|f| f.contains(':')) {
                continue;
            }
            let range = parse_line(line).with_context(|| format!("line {}", lineno + 1))?;
            ranges.push(range);
        }

        ranges.sort_by_key(|r| r.start);
        if let Some(pair) = ranges.windows(2).find(|w| w[1].start <= w[0].end) {
            bail!(
                "ranges {}-{} and {}-{} overlap",
                Ipv4Addr::from(pair[0].start),
                Ipv4Addr::from(pair[0].end),
                Ipv4Addr::from(pair[1].start),
                Ipv4Addr::from(pair[1].end)
            );
        }

        Ok(Self { ranges })
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }
}

fn parse_line(line: &str) -> Result<Range> {
    let mut fields = line.split(',').map(str::trim);
    let (Some(start), Some(end), Some(country), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        bail!("expected start,end,country");
    };

    let start: Ipv4Addr = start.parse().with_context(|| format!("bad start address {:?}", start))?;
    let end: Ipv4Addr = end.parse().with_context(|| format!("bad end address {:?}", end))?;
    if u32::from(start) > u32::from(end) {
        bail!("range start {} is after end {}", start, end);
    }
    if country.len() != 2 || !country.chars().all(|c| c.is_ascii_alphabetic()) {
        bail!("bad country code {:?}", country);
    }

    Ok(Range {
        start: start.into(),
        end: end.into(),
        country: country.to_ascii_lowercase(),
    })
}

impl CountryLookup for RangeTable {
    fn lookup(&self, ip: Ipv4Addr) -> Result<String> {
        let addr = u32::from(ip);
        // First range starting after addr; the candidate is the one before it
        let idx = self.ranges.partition_point(|r| r.start <= addr);
        idx.checked_sub(1)
            .map(|i| &self.ranges[i])
            .filter(|r| addr <= r.end)
            .map(|r| r.country.clone())
            .ok_or_else(|| anyhow!("no range covers {}", ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
# start,end,cc
1.0.0.0,1.0.0.255,AU
2.16.0.0, 2.16.255.255, fr

81.2.69.0,81.2.69.255,GB # trailing comment
";

    #[test]
    fn test_lookup_hits_and_misses() {
        let table = RangeTable::parse(TABLE).unwrap();
        assert_eq!(table.len(), 3);

        assert_eq!(table.lookup(Ipv4Addr::new(1, 0, 0, 0)).unwrap(), "au");
        assert_eq!(table.lookup(Ipv4Addr::new(1, 0, 0, 255)).unwrap(), "au");
        assert_eq!(table.lookup(Ipv4Addr::new(2, 16, 4, 4)).unwrap(), "fr");
        assert_eq!(table.lookup(Ipv4Addr::new(81, 2, 69, 160)).unwrap(), "gb");

        assert!(table.lookup(Ipv4Addr::new(0, 255, 255, 255)).is_err());
        assert!(table.lookup(Ipv4Addr::new(1, 0, 1, 0)).is_err());
        assert!(table.lookup(Ipv4Addr::new(255, 255, 255, 255)).is_err());
    }

    #[test]
    fn test_skips_ipv6_rows() {
        let table = RangeTable::parse(
            "1.0.0.0,1.0.0.255,AU\n2001:200::,2001:200:ffff:ffff:ffff:ffff:ffff:ffff,JP\n",
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        assert_eq!(table.lookup(Ipv4Addr::new(1, 0, 0, 1)).unwrap(), "au");
    }

    #[test]
    fn test_rejects_bad_lines() {
        assert!(RangeTable::parse("1.0.0.0,1.0.0.255").is_err());
        assert!(RangeTable::parse("1.0.0.9,1.0.0.1,au").is_err());
        assert!(RangeTable::parse("1.0.0.0,1.0.0.255,aus").is_err());
        assert!(RangeTable::parse("1.0.0.0,1.0.0.255,au,x").is_err());
    }

    #[test]
    fn test_rejects_overlap() {
        let err = RangeTable::parse("1.0.0.0,1.0.0.255,au\n1.0.0.128,1.0.1.0,nz").unwrap_err();
        assert!(err.to_string().contains("overlap"));
    }

    #[test]
    fn test_empty_table_misses() {
        let table = RangeTable::default();
        assert!(table.lookup(Ipv4Addr::new(8, 8, 8, 8)).is_err());
    }
}
