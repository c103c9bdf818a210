use std::str::FromStr;

use tuirealm::ratatui::style::Color;

use crate::types::TaskStatus;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum ThemePreset {
    #[default]
    Default,
    Light,
    HighContrast,
    Mono,
}

impl ThemePreset {
    pub const ALL: [Self; 4] = [Self::Default, Self::Light, Self::HighContrast, Self::Mono];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Light => "light",
            Self::HighContrast => "high-contrast",
            Self::Mono => "mono",
        }
    }
}

impl FromStr for ThemePreset {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Self::Default),
            "light" | "day" => Ok(Self::Light),
            "high-contrast" | "high_contrast" | "contrast" => Ok(Self::HighContrast),
            "mono" | "monochrome" => Ok(Self::Mono),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Theme {
    pub base: BasePalette,
    pub status: StatusPalette,
    pub chart: ChartPalette,
}

#[derive(Debug, Clone, Copy)]
pub struct BasePalette {
    pub canvas: Color,
    pub text: Color,
    pub text_muted: Color,
    pub header: Color,
    pub border: Color,
    pub danger: Color,
}

#[derive(Debug, Clone, Copy)]
pub struct StatusPalette {
    pub pending: Color,
    pub in_progress: Color,
    pub completed: Color,
    pub failed: Color,
}

#[derive(Debug, Clone, Copy)]
pub struct ChartPalette {
    pub bar: Color,
    pub axis: Color,
    pub label: Color,
}

impl Theme {
    pub fn from_preset(preset: ThemePreset) -> Self {
        match preset {
            ThemePreset::Default => Self {
                base: BasePalette {
                    canvas: Color::Rgb(36, 40, 56),
                    text: Color::White,
                    text_muted: Color::DarkGray,
                    header: Color::Cyan,
                    border: Color::DarkGray,
                    danger: Color::Red,
                },
                status: StatusPalette {
                    pending: Color::Gray,
                    in_progress: Color::Yellow,
                    completed: Color::LightGreen,
                    failed: Color::Red,
                },
                chart: ChartPalette {
                    bar: Color::Rgb(70, 130, 180),
                    axis: Color::Gray,
                    label: Color::White,
                },
            },
            ThemePreset::Light => Self {
                base: BasePalette {
                    canvas: Color::Rgb(246, 248, 252),
                    text: Color::Rgb(32, 38, 51),
                    text_muted: Color::Rgb(100, 116, 139),
                    header: Color::Rgb(37, 99, 235),
                    border: Color::Rgb(203, 213, 225),
                    danger: Color::Rgb(220, 38, 38),
                },
                status: StatusPalette {
                    pending: Color::Rgb(100, 116, 139),
                    in_progress: Color::Rgb(202, 138, 4),
                    completed: Color::Rgb(22, 163, 74),
                    failed: Color::Rgb(220, 38, 38),
                },
                chart: ChartPalette {
                    bar: Color::Rgb(37, 99, 235),
                    axis: Color::Rgb(100, 116, 139),
                    label: Color::Rgb(32, 38, 51),
                },
            },
            ThemePreset::HighContrast => Self {
                base: BasePalette {
                    canvas: Color::Black,
                    text: Color::White,
                    text_muted: Color::Gray,
                    header: Color::LightCyan,
                    border: Color::White,
                    danger: Color::LightRed,
                },
                status: StatusPalette {
                    pending: Color::White,
                    in_progress: Color::LightYellow,
                    completed: Color::LightGreen,
                    failed: Color::LightRed,
                },
                chart: ChartPalette {
                    bar: Color::LightCyan,
                    axis: Color::White,
                    label: Color::White,
                },
            },
            ThemePreset::Mono => Self {
                base: BasePalette {
                    canvas: Color::Reset,
                    text: Color::White,
                    text_muted: Color::DarkGray,
                    header: Color::White,
                    border: Color::Gray,
                    danger: Color::White,
                },
                status: StatusPalette {
                    pending: Color::DarkGray,
                    in_progress: Color::Gray,
                    completed: Color::White,
                    failed: Color::White,
                },
                chart: ChartPalette {
                    bar: Color::Gray,
                    axis: Color::DarkGray,
                    label: Color::White,
                },
            },
        }
    }

    pub fn status_color(&self, status: TaskStatus) -> Color {
        match status {
            TaskStatus::Pending => self.status.pending,
            TaskStatus::InProgress => self.status.in_progress,
            TaskStatus::Completed => self.status.completed,
            TaskStatus::Failed => self.status.failed,
        }
    }

    /// Bars stay in the chart colour until the task finishes, then take the
    /// final status colour.
    pub fn bar_color(&self, status: TaskStatus) -> Color {
        match status {
            TaskStatus::Pending | TaskStatus::InProgress => self.chart.bar,
            TaskStatus::Completed | TaskStatus::Failed => self.status_color(status),
        }
    }
}

impl Default for Theme {
    fn default() -> Self {
        Self::from_preset(ThemePreset::Default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_theme_default_preset() {
        let theme = Theme::default();
        assert_eq!(theme.base.header, Color::Cyan);
        assert_eq!(theme.base.text, Color::White);
        assert_eq!(theme.chart.bar, Color::Rgb(70, 130, 180));
    }

    #[test]
    fn test_status_color_covers_every_status() {
        let theme = Theme::default();
        assert_eq!(theme.status_color(TaskStatus::Completed), Color::LightGreen);
        assert_eq!(theme.status_color(TaskStatus::InProgress), Color::Yellow);
        assert_eq!(theme.status_color(TaskStatus::Pending), Color::Gray);
        assert_eq!(theme.status_color(TaskStatus::Failed), Color::Red);
    }

    #[test]
    fn test_bar_color_follows_terminal_status() {
        let theme = Theme::from_preset(ThemePreset::Light);
        assert_eq!(theme.bar_color(TaskStatus::InProgress), theme.chart.bar);
        assert_eq!(
            theme.bar_color(TaskStatus::Failed),
            theme.status_color(TaskStatus::Failed)
        );
    }

    #[test]
    fn test_theme_preset_parse() {
        assert_eq!(ThemePreset::from_str("default"), Ok(ThemePreset::Default));
        assert_eq!(ThemePreset::from_str("light"), Ok(ThemePreset::Light));
        assert_eq!(
            ThemePreset::from_str("high-contrast"),
            Ok(ThemePreset::HighContrast)
        );
        assert_eq!(ThemePreset::from_str(" MONO "), Ok(ThemePreset::Mono));
        assert!(ThemePreset::from_str("unknown").is_err());
    }

    #[test]
    fn test_theme_preset_names_round_trip() {
        for preset in ThemePreset::ALL {
            assert_eq!(ThemePreset::from_str(preset.as_str()), Ok(preset));
        }
    }
}
