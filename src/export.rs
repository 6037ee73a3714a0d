use crate::diffusion::DiffusionField;
use anyhow::{Context, Result};
use log::info;
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Streams the complete diffusion grid to a `;`-separated CSV file.
///
/// Header: `iteration;totalTime;x;y;<signal names...>`, then one row per grid
/// cell for every call to [`DiffusionExporter::write`].
pub struct DiffusionExporter<W: Write> {
    writer: csv::Writer<W>,
    signal_count: usize,
}

impl DiffusionExporter<File> {
    pub fn create<P: AsRef<Path>>(path: P, field: &DiffusionField) -> Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create diffusion output '{}'", path.display()))?;
        info!("[diffusion] Writing grid data to {}", path.display());
        Self::new(file, field)
    }
}

impl<W: Write> DiffusionExporter<W> {
    pub fn new(inner: W, field: &DiffusionField) -> Result<Self> {
        let mut writer = csv::WriterBuilder::new().delimiter(b';').from_writer(inner);

        let mut header = vec!["iteration".to_string(), "totalTime".into(), "x".into(), "y".into()];
        for id in field.signal_ids() {
            header.push(field.signal_name(id)?.to_string());
        }
        writer.write_record(&header)?;

        Ok(Self { writer, signal_count: field.signal_count() })
    }

    /// Appends one row per grid cell. Signals registered after creation are
    /// not part of the header and are skipped.
    pub fn write(&mut self, field: &DiffusionField, total_time: f64) -> Result<()> {
        let iteration = field.iteration().to_string();
        let time = total_time.to_string();
        let ids: Vec<_> = field.signal_ids().take(self.signal_count).collect();

        let mut record = Vec::with_capacity(4 + ids.len());
        for coord in field.grid_size().coordinates() {
            record.clear();
            record.push(iteration.clone());
            record.push(time.clone());
            record.push(coord.x.to_string());
            record.push(coord.y.to_string());
            record.extend(ids.iter().map(|id| field.get(*id, coord).to_string()));
            self.writer.write_record(&record)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| anyhow::anyhow!("Failed to flush diffusion output: {}", e.error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Coordinate, GridSize};
    use signal_common::Vec2;

    #[test]
    fn writes_header_and_one_row_per_cell() {
        let mut field = DiffusionField::new(Vec2::new(2.0, 1.0), GridSize::new(2, 1));
        let a = field.register_signal("A", 0.0, 0.0);
        field.register_signal("B", 0.0, 0.0);
        field.set(a, Coordinate::new(1, 0), 1.5);

        let mut exporter = DiffusionExporter::new(Vec::new(), &field).unwrap();
        field.update(0.5);
        exporter.write(&field, 0.5).unwrap();
        let text = String::from_utf8(exporter.into_inner().unwrap()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["iteration;totalTime;x;y;A;B", "1;0.5;0;0;0;0", "1;0.5;1;0;1.5;0"]);
    }
}
