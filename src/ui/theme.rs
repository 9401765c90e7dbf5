use owo_colors::Style;
use std::sync::OnceLock;

static THEME: OnceLock<Theme> = OnceLock::new();

/// Colors for the human-readable side of every command
#[derive(Debug, Clone, Copy)]
pub struct Theme {
    /// Command headings: the package found, the reference scope, the resolved moniker
    pub heading: Style,
    pub ok: Style,
    pub failure: Style,
    /// Left column of summary rows and `info` lines
    pub label: Style,
    /// Icon in front of an `info` line
    pub marker: Style,
}

impl Theme {
    /// Colored only for a terminal with `NO_COLOR` unset
    pub fn for_output(is_terminal: bool, no_color: bool) -> Self {
        if !is_terminal || no_color {
            return Self {
                heading: Style::new(),
                ok: Style::new(),
                failure: Style::new(),
                label: Style::new(),
                marker: Style::new(),
            };
        }
        Self {
            heading: Style::new().cyan().bold(),
            ok: Style::new().green().bold(),
            failure: Style::new().red().bold(),
            label: Style::new().white().dimmed(),
            marker: Style::new().magenta(),
        }
    }

    fn from_env() -> Self {
        let no_color = std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty());
        Self::for_output(console::Term::stdout().is_term(), no_color)
    }
}

pub fn theme() -> &'static Theme {
    THEME.get_or_init(Theme::from_env)
}
