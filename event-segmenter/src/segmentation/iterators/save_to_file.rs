use crate::segmentation::{Edge, Event};
use std::{
    fs::File,
    io::{BufWriter, Error, Write},
    path::Path,
};

pub trait SavablePoint {
    const HEADER: &'static str;

    fn write_to_file<W: Write>(&self, file: &mut W) -> Result<(), Error>;
}

impl SavablePoint for Event {
    const HEADER: &'static str = "index,start,finish,length,class,area,baseline_before,baseline_after,average_blockage,max_blockage,local_stdev,intra_crossings";

    fn write_to_file<W: Write>(&self, file: &mut W) -> Result<(), Error> {
        writeln!(file, "{self}")
    }
}

impl SavablePoint for Edge {
    const HEADER: &'static str = "location,kind,local_baseline,local_stdev";

    fn write_to_file<W: Write>(&self, file: &mut W) -> Result<(), Error> {
        writeln!(file, "{self}")
    }
}

impl<T: SavablePoint> SavablePoint for &T {
    const HEADER: &'static str = T::HEADER;

    fn write_to_file<W: Write>(&self, file: &mut W) -> Result<(), Error> {
        (*self).write_to_file(file)
    }
}

pub trait SaveToFileFilter<I>
where
    I: Iterator,
    I::Item: SavablePoint,
{
    fn save_to_file(self, path: &Path) -> Result<(), Error>;
}

impl<I> SaveToFileFilter<I> for I
where
    I: Iterator,
    I::Item: SavablePoint,
{
    fn save_to_file(self, path: &Path) -> Result<(), Error> {
        let mut file = BufWriter::new(File::create(path)?);
        writeln!(file, "{}", I::Item::HEADER)?;
        for item in self {
            item.write_to_file(&mut file)?;
        }
        file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ErrorCode, segmentation::EdgeKind};

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        let events = [
            Event {
                index: 0,
                start: 10,
                finish: 30,
                length: 20,
                class: Some(ErrorCode::Cusum),
                ..Default::default()
            },
            Event {
                index: 1,
                start: 50,
                finish: 52,
                length: 2,
                class: Some(ErrorCode::TooShort),
                ..Default::default()
            },
        ];
        events.iter().save_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("index,start,finish"));
        assert!(lines[1].starts_with("0,10,30,20,cusum,"));
        assert!(lines[2].starts_with("1,50,52,2,too_short,"));
    }

    #[test]
    fn edge_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edges.csv");
        let edge = Edge {
            location: 3,
            kind: EdgeKind::Falling,
            local_stdev: 1.0,
            local_baseline: 2.0,
        };
        std::iter::once(edge).save_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "location,kind,local_baseline,local_stdev\n3,falling,2,1\n");
    }
}
