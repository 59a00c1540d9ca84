//! Format negotiation: intersects sensor-advertised and
//! pipeline-accepted pixel formats and frame sizes (spec
//! "FormatCatalog"). Built once per stream at construction and
//! immutable thereafter.

use crate::collaborators::{ImageData, SensorCtl};
use crate::error::{CoreError, Result};

/// A pixel/sub-pixel format pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatId {
    pub pixelformat: u32,
    pub sub_pixelformat: u32,
}

/// A negotiated width/height/format triple, as read back from the
/// sensor after `set_format`/`try_format`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFormat {
    pub width: u32,
    pub height: u32,
    pub format: FormatId,
}

/// Frame-size capability: either an explicit list or a stepwise range.
#[derive(Debug, Clone)]
pub enum FrameSizeCaps {
    Discrete(Vec<(u32, u32)>),
    Stepwise(StepwiseSize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepwiseSize {
    pub min_width: u32,
    pub max_width: u32,
    pub step_width: u32,
    pub min_height: u32,
    pub max_height: u32,
    pub step_height: u32,
}

/// One entry in a built format catalog (spec §4.2: index, flags,
/// pixel/sub-pixel format, and a human-readable description, carried
/// straight from the sensor's advertised entry for the ones the
/// pipeline accepts).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatEntry {
    pub index: u32,
    pub format: FormatId,
    pub flags: u32,
    pub description: String,
}

/// Frame-size entry as returned by `enum_frame_sizes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSizeEntry {
    Discrete { width: u32, height: u32 },
    Stepwise(StepwiseSize),
}

/// Frame-interval capability at a given format/size, as returned
/// straight from the sensor (spec §6: interval is pass-through, no
/// pipeline intersection).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameIntervalCaps {
    Discrete { numerator: u32, denominator: u32 },
    Stepwise(StepwiseInterval),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepwiseInterval {
    pub min_numerator: u32,
    pub min_denominator: u32,
    pub max_numerator: u32,
    pub max_denominator: u32,
    pub step_numerator: u32,
    pub step_denominator: u32,
}

/// Stream-parameter pass-through argument (`S_PARM`/`G_PARM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParm {
    pub numerator: u32,
    pub denominator: u32,
}

/// The intersection of sensor-supported and pipeline-supported pixel
/// formats for one stream.
#[derive(Debug, Clone)]
pub struct FormatCatalog {
    entries: Vec<FormatEntry>,
}

impl FormatCatalog {
    /// Walks the sensor's advertised formats from index zero until the
    /// terminal `None`, keeping only those the pipeline accepts, and
    /// renumbering the survivors densely from zero.
    #[must_use]
    pub fn build(sensor: &dyn SensorCtl, pipeline: &dyn ImageData) -> Self {
        let mut entries = Vec::new();
        let mut index = 0u32;
        while let Some(entry) = sensor.enum_format(index) {
            if pipeline.accepts_format(entry.format) {
                entries.push(FormatEntry {
                    index: entries.len() as u32,
                    format: entry.format,
                    flags: entry.flags,
                    description: entry.description,
                });
            }
            index += 1;
        }
        tracing::debug!(count = entries.len(), "format catalog built");
        Self { entries }
    }

    pub fn get(&self, index: u32) -> Result<FormatEntry> {
        self.entries
            .get(index as usize)
            .cloned()
            .ok_or_else(|| CoreError::InvalidArg(format!("format index {index} out of range")))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Enumerates frame sizes for `format` by intersecting the
    /// sensor's and pipeline's size capability.
    pub fn enum_frame_sizes(
        &self,
        sensor: &dyn SensorCtl,
        pipeline: &dyn ImageData,
        format: FormatId,
    ) -> Result<Vec<FrameSizeEntry>> {
        let sensor_caps = sensor
            .frame_size_caps(format)
            .ok_or_else(|| CoreError::InvalidArg("format not advertised by sensor".into()))?;

        match sensor_caps {
            FrameSizeCaps::Discrete(sizes) => {
                let out: Vec<_> = sizes
                    .into_iter()
                    .filter(|&(w, h)| pipeline.try_format(w, h))
                    .map(|(width, height)| FrameSizeEntry::Discrete { width, height })
                    .collect();
                if out.is_empty() {
                    return Err(CoreError::InvalidArg("empty frame-size intersection".into()));
                }
                Ok(out)
            }
            FrameSizeCaps::Stepwise(s) => {
                let pw = match pipeline.frame_size_caps() {
                    FrameSizeCaps::Stepwise(p) => p,
                    FrameSizeCaps::Discrete(_) => {
                        return Err(CoreError::InvalidArg(
                            "pipeline does not advertise a stepwise size range".into(),
                        ))
                    }
                };
                let merged = StepwiseSize {
                    min_width: s.min_width.max(pw.min_width),
                    max_width: s.max_width.min(pw.max_width),
                    step_width: lcm(s.step_width, pw.step_width),
                    min_height: s.min_height.max(pw.min_height),
                    max_height: s.max_height.min(pw.max_height),
                    step_height: lcm(s.step_height, pw.step_height),
                };
                if merged.min_width > merged.max_width || merged.min_height > merged.max_height {
                    return Err(CoreError::InvalidArg("empty frame-size intersection".into()));
                }
                Ok(vec![FrameSizeEntry::Stepwise(merged)])
            }
        }
    }
}

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: u32, b: u32) -> u32 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}
