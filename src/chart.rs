//! Hashtag frequency bar chart geometry.
//!
//! [`render`] is a pure function from an [`Analytics`] record to bar rectangles
//! and two axis descriptors laid out on a fixed canvas. Coordinates follow the
//! usual screen convention: `x` grows to the right and `y` grows downwards, so
//! the plot baseline sits at `height - margin.bottom`.

use std::cmp::Reverse;

use crate::types::Analytics;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margin {
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
    pub left: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChartLayout {
    pub width: f64,
    pub height: f64,
    pub margin: Margin,
    /// Fraction of each band step left empty, applied inside and outside.
    pub band_padding: f64,
    pub y_tick_count: usize,
}

impl ChartLayout {
    pub const DEFAULT: Self = Self {
        width: 500.0,
        height: 300.0,
        margin: Margin {
            top: 20.0,
            right: 30.0,
            bottom: 50.0,
            left: 40.0,
        },
        band_padding: 0.3,
        y_tick_count: 3,
    };

    pub fn plot_left(&self) -> f64 {
        self.margin.left
    }

    pub fn plot_right(&self) -> f64 {
        self.width - self.margin.right
    }

    pub fn plot_top(&self) -> f64 {
        self.margin.top
    }

    pub fn plot_bottom(&self) -> f64 {
        self.height - self.margin.bottom
    }
}

impl Default for ChartLayout {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Maps an ordered list of categories onto equal-width bands.
#[derive(Debug, Clone, PartialEq)]
pub struct BandScale {
    domain: Vec<String>,
    start: f64,
    step: f64,
    bandwidth: f64,
}

impl BandScale {
    const ALIGN: f64 = 0.5;

    pub fn new(domain: Vec<String>, range: (f64, f64), padding: f64) -> Self {
        let (range_start, range_stop) = range;
        let count = domain.len() as f64;
        let span = range_stop - range_start;
        let step = span / (count - padding + padding * 2.0).max(1.0);
        let start = range_start + (span - step * (count - padding)) * Self::ALIGN;

        Self {
            domain,
            start,
            step,
            bandwidth: step * (1.0 - padding),
        }
    }

    pub fn domain(&self) -> &[String] {
        &self.domain
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn bandwidth(&self) -> f64 {
        self.bandwidth
    }

    pub fn position_at(&self, index: usize) -> f64 {
        self.start + self.step * index as f64
    }

    pub fn position(&self, category: &str) -> Option<f64> {
        self.domain
            .iter()
            .position(|candidate| candidate == category)
            .map(|index| self.position_at(index))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Increment {
    /// Ticks are multiples of this value.
    Whole(f64),
    /// Ticks are multiples of `1 / value`; kept inverted to avoid float drift.
    Inverse(f64),
}

impl Increment {
    fn ceil(self, value: f64) -> f64 {
        match self {
            Self::Whole(step) => (value / step).ceil() * step,
            Self::Inverse(inverse) => (value * inverse).ceil() / inverse,
        }
    }

    fn ticks(self, start: f64, stop: f64) -> Vec<f64> {
        let (first, last) = match self {
            Self::Whole(step) => ((start / step).ceil(), (stop / step).floor()),
            Self::Inverse(inverse) => ((start * inverse).ceil(), (stop * inverse).floor()),
        };
        if last < first {
            return Vec::new();
        }

        (first as i64..=last as i64)
            .map(|index| match self {
                Self::Whole(step) => index as f64 * step,
                Self::Inverse(inverse) => index as f64 / inverse,
            })
            .collect()
    }
}

/// Picks a 1, 2 or 5 times a power of ten increment giving roughly `count` ticks.
fn tick_increment(start: f64, stop: f64, count: usize) -> Option<Increment> {
    let step = (stop - start) / count.max(1) as f64;
    if !step.is_finite() || step <= 0.0 {
        return None;
    }

    let power = step.log10().floor();
    let error = step / 10f64.powf(power);
    let factor = if error >= 50f64.sqrt() {
        10.0
    } else if error >= 10f64.sqrt() {
        5.0
    } else if error >= 2f64.sqrt() {
        2.0
    } else {
        1.0
    };

    if power < 0.0 {
        Some(Increment::Inverse(10f64.powf(-power) / factor))
    } else {
        Some(Increment::Whole(10f64.powf(power) * factor))
    }
}

/// Maps `[domain.0, domain.1]` linearly onto `[range.0, range.1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    /// Extends the upper bound to a round value. The lower bound is kept, so
    /// mapped values stay proportional to their distance from it.
    pub fn nice(self, count: usize) -> Self {
        let (start, mut stop) = self.domain;
        let mut previous = None;
        for _ in 0..10 {
            let Some(increment) = tick_increment(start, stop, count) else {
                break;
            };
            if previous == Some(increment) {
                break;
            }
            stop = increment.ceil(stop);
            previous = Some(increment);
        }

        Self {
            domain: (start, stop),
            range: self.range,
        }
    }

    /// A collapsed domain maps everything onto the start of the range.
    pub fn map(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        if d1 == d0 {
            return r0;
        }
        r0 + (value - d0) / (d1 - d0) * (r1 - r0)
    }

    pub fn ticks(&self, count: usize) -> Vec<f64> {
        let (start, stop) = self.domain;
        match tick_increment(start, stop, count) {
            Some(increment) => increment.ticks(start, stop),
            None => vec![start],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisOrientation {
    Bottom,
    Left,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub label: String,
    /// Offset along the axis in canvas units.
    pub position: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub orientation: AxisOrientation,
    /// Cross-axis translation: `y` for a bottom axis, `x` for a left axis.
    pub offset: f64,
    pub range: (f64, f64),
    pub ticks: Vec<Tick>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub category: String,
    pub count: u64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartGeometry {
    pub layout: ChartLayout,
    pub bars: Vec<Bar>,
    pub x_axis: Axis,
    pub y_axis: Axis,
    /// Linear domain after rounding the upper bound.
    pub y_domain: (f64, f64),
}

impl ChartGeometry {
    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

/// Hashtag counts sorted by descending count, ties broken by ascending name.
pub fn ordered_counts(analytics: &Analytics) -> Vec<(String, u64)> {
    let mut counts = analytics
        .hashtag_counts
        .iter()
        .map(|(tag, count)| (tag.clone(), *count))
        .collect::<Vec<_>>();
    counts.sort_by(|(a_tag, a_count), (b_tag, b_count)| {
        Reverse(*a_count)
            .cmp(&Reverse(*b_count))
            .then_with(|| a_tag.cmp(b_tag))
    });
    counts
}

pub fn render(analytics: &Analytics) -> ChartGeometry {
    render_with(analytics, &ChartLayout::DEFAULT)
}

pub fn render_with(analytics: &Analytics, layout: &ChartLayout) -> ChartGeometry {
    let counts = ordered_counts(analytics);
    let baseline = layout.plot_bottom();

    let x = BandScale::new(
        counts.iter().map(|(tag, _)| tag.clone()).collect(),
        (layout.plot_left(), layout.plot_right()),
        layout.band_padding,
    );

    let max_count = counts.iter().map(|(_, count)| *count).max().unwrap_or(0);
    let y = LinearScale::new((0.0, max_count as f64), (baseline, layout.plot_top()))
        .nice(layout.y_tick_count);

    let bars = counts
        .iter()
        .enumerate()
        .map(|(index, (tag, count))| {
            let top = y.map(*count as f64);
            Bar {
                category: tag.clone(),
                count: *count,
                x: x.position_at(index),
                y: top,
                width: x.bandwidth(),
                height: (baseline - top).max(0.0),
            }
        })
        .collect();

    let x_axis = Axis {
        orientation: AxisOrientation::Bottom,
        offset: baseline,
        range: (layout.plot_left(), layout.plot_right()),
        ticks: x
            .domain()
            .iter()
            .enumerate()
            .map(|(index, tag)| Tick {
                label: tag.clone(),
                position: x.position_at(index) + x.bandwidth() / 2.0,
            })
            .collect(),
    };

    let y_axis = Axis {
        orientation: AxisOrientation::Left,
        offset: layout.plot_left(),
        range: (baseline, layout.plot_top()),
        ticks: y
            .ticks(layout.y_tick_count)
            .into_iter()
            .map(|value| Tick {
                label: format_tick(value),
                position: y.map(value),
            })
            .collect(),
    };

    ChartGeometry {
        layout: *layout,
        bars,
        x_axis,
        y_axis,
        y_domain: y.domain(),
    }
}

fn format_tick(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
