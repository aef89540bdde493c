// SPDX-License-Identifier: GPL-3.0-only

//! Terminal control surface
//!
//! Shows the composited preview using Unicode half-block characters and maps
//! keys to live parameter changes. Streaming starts immediately; `s` toggles
//! it.

use crate::backends::camera::types::Frame;
use crate::config::Config;
use crate::constants::limits::{MAX_KERNEL, MAX_SIGMA, MIN_KERNEL};
use crate::constants::presets::{FRAMERATES, RESOLUTIONS};
use crate::constants::timing::UI_POLL_INTERVAL_MS;
use crate::pipelines::stream::{CompositionParams, LiveParams, PipelineController};

use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal, backend::CrosstermBackend, buffer::Buffer, layout::Rect, style::Color,
    widgets::Widget,
};
use std::io::{self, stdout};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const SCALE_STEP: f32 = 1.1;
const OFFSET_STEP: f32 = 0.05;
const SIGMA_STEP: f32 = 1.0;

/// Run the terminal control surface
pub fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let params = Arc::new(LiveParams::new(config.composition_params()));
    let mut controller = PipelineController::new(Box::new(config.device_backend()), params);

    // Set up terminal
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut controller);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if controller.is_running() {
        controller.stop()?;
    }
    result
}

fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    controller: &mut PipelineController,
) -> Result<(), Box<dyn std::error::Error>> {
    let params = controller.params();
    let preview = controller.preview();

    let mut frame_widget = FrameWidget::new();
    let mut show_help = false;
    let mut status_message = toggle_stream(controller);

    loop {
        if let Some(frame) = preview.pop_latest() {
            frame_widget.update_frame(frame);
        }
        if let Some(err) = controller.take_error() {
            error!(error = %err, "Stream stopped");
            status_message = format!("Stopped: {}", err);
        }

        let info_line = build_info_line(controller, &params.snapshot());
        let message_line = if show_help {
            HELP_MESSAGE.to_string()
        } else {
            status_message.clone()
        };

        terminal.draw(|f| {
            let area = f.area();

            // Reserve the bottom two lines for status
            let preview_area = Rect {
                x: area.x,
                y: area.y,
                width: area.width,
                height: area.height.saturating_sub(2),
            };
            f.render_widget(&frame_widget, preview_area);

            for (row, message) in [&info_line, &message_line].into_iter().enumerate() {
                let status_area = Rect {
                    x: area.x,
                    y: area.height.saturating_sub(2 - row as u16),
                    width: area.width,
                    height: 1,
                };
                f.render_widget(StatusBar { message }, status_area);
            }
        })?;

        if !event::poll(Duration::from_millis(UI_POLL_INTERVAL_MS))? {
            continue;
        }
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            break;
        }

        match handle_key(key.code, &params) {
            KeyOutcome::Quit => break,
            KeyOutcome::ToggleStream => {
                show_help = false;
                status_message = toggle_stream(controller);
                if !controller.is_running() {
                    frame_widget = FrameWidget::new();
                }
            }
            KeyOutcome::ToggleHelp => show_help = !show_help,
            KeyOutcome::Updated(message) => {
                show_help = false;
                status_message = message;
            }
            KeyOutcome::Ignored => {}
        }
    }

    Ok(())
}

/// Start when idle, stop when running; returns a status message
fn toggle_stream(controller: &mut PipelineController) -> String {
    if controller.is_running() {
        return match controller.stop() {
            Ok(()) => "Stopped".to_string(),
            Err(e) => format!("Error: {}", e),
        };
    }
    match controller.start() {
        Ok(()) => {
            let segmenter = controller
                .session()
                .map(|s| s.segmenter.clone())
                .unwrap_or_default();
            info!(segmenter = %segmenter, "Streaming from terminal");
            format!("Streaming ({}) | '?' help", segmenter)
        }
        Err(e) => {
            error!(error = %e, "Failed to start stream");
            format!("Error: {}", e)
        }
    }
}

const HELP_MESSAGE: &str = "+/- scale | arrows move | h/v flip | [ ] kernel | , . sigma | \
                            r resolution | f fps | p preview | s start/stop | q quit";

/// Result of a key press
#[derive(Debug, Clone, PartialEq)]
enum KeyOutcome {
    Quit,
    ToggleStream,
    ToggleHelp,
    /// Parameters changed; the message describes the new value
    Updated(String),
    Ignored,
}

/// Map a key to a parameter change
fn handle_key(code: KeyCode, params: &LiveParams) -> KeyOutcome {
    let describe = |p: &CompositionParams| -> String {
        match code {
            KeyCode::Char('+' | '=' | '-') => format!("Scale {:.2}", p.scale),
            KeyCode::Left | KeyCode::Right | KeyCode::Up | KeyCode::Down => {
                format!("Offset {:.2}, {:.2}", p.offset_x, p.offset_y)
            }
            KeyCode::Char('h' | 'v') => format!(
                "Flip horizontal: {} | vertical: {}",
                on_off(p.flip_horizontal),
                on_off(p.flip_vertical)
            ),
            KeyCode::Char('[' | ']') => format!("Smoothing kernel {}", p.smooth_kernel),
            KeyCode::Char(',' | '.') => format!("Smoothing sigma {:.1}", p.smooth_sigma),
            KeyCode::Char('r') => format!("Resolution {}x{}", p.width, p.height),
            KeyCode::Char('f') => format!("Framerate {}fps", p.fps),
            KeyCode::Char('p') => format!("Preview {}", on_off(p.show_preview)),
            _ => String::new(),
        }
    };

    let change: fn(&mut CompositionParams) = match code {
        KeyCode::Char('q') | KeyCode::Esc => return KeyOutcome::Quit,
        KeyCode::Char('s') => return KeyOutcome::ToggleStream,
        KeyCode::Char('?') => return KeyOutcome::ToggleHelp,
        KeyCode::Char('+' | '=') => |p| p.scale *= SCALE_STEP,
        KeyCode::Char('-') => |p| p.scale /= SCALE_STEP,
        KeyCode::Left => |p| p.offset_x -= OFFSET_STEP,
        KeyCode::Right => |p| p.offset_x += OFFSET_STEP,
        KeyCode::Up => |p| p.offset_y -= OFFSET_STEP,
        KeyCode::Down => |p| p.offset_y += OFFSET_STEP,
        KeyCode::Char('h') => |p| p.flip_horizontal = !p.flip_horizontal,
        KeyCode::Char('v') => |p| p.flip_vertical = !p.flip_vertical,
        KeyCode::Char('[') => |p| p.smooth_kernel = p.smooth_kernel.saturating_sub(2).max(MIN_KERNEL),
        KeyCode::Char(']') => |p| p.smooth_kernel = (p.smooth_kernel + 2).min(MAX_KERNEL),
        KeyCode::Char(',') => |p| p.smooth_sigma -= SIGMA_STEP,
        KeyCode::Char('.') => |p| p.smooth_sigma = (p.smooth_sigma + SIGMA_STEP).min(MAX_SIGMA),
        KeyCode::Char('r') => |p| {
            let (width, height) = next_preset(RESOLUTIONS, (p.width, p.height));
            p.width = width;
            p.height = height;
        },
        KeyCode::Char('f') => |p| p.fps = next_preset(FRAMERATES, p.fps),
        KeyCode::Char('p') => |p| p.show_preview = !p.show_preview,
        _ => return KeyOutcome::Ignored,
    };

    let updated = params.update(change);
    KeyOutcome::Updated(describe(&updated))
}

/// Entry after `current`, wrapping; the first entry when `current` isn't listed
fn next_preset<T: Copy + PartialEq>(presets: &[T], current: T) -> T {
    match presets.iter().position(|p| *p == current) {
        Some(index) => presets[(index + 1) % presets.len()],
        None => presets[0],
    }
}

fn on_off(value: bool) -> &'static str {
    if value { "on" } else { "off" }
}

fn build_info_line(controller: &PipelineController, params: &CompositionParams) -> String {
    let stats = controller.stats();
    let state = if controller.is_running() {
        "LIVE"
    } else {
        "IDLE"
    };
    format!(
        "{} {}x{}@{} | scale {:.2} | {} frames | {:.1} ms | dropped {} | restarts {}",
        state,
        params.width,
        params.height,
        params.fps,
        params.scale,
        stats.frames_processed,
        stats.last_frame_us as f64 / 1000.0,
        stats.preview_drops,
        stats.encoder_restarts
    )
}

/// Widget that renders a frame using half-block characters
struct FrameWidget {
    frame: Option<Frame>,
}

impl FrameWidget {
    fn new() -> Self {
        Self { frame: None }
    }

    fn update_frame(&mut self, frame: Frame) {
        self.frame = Some(frame);
    }
}

impl Widget for &FrameWidget {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let Some(frame) = &self.frame else {
            let msg = "Waiting for frames...";
            let x = area.x + (area.width.saturating_sub(msg.len() as u16)) / 2;
            let y = area.y + area.height / 2;
            if y < area.y + area.height && x < area.x + area.width {
                buf.set_string(x, y, msg, ratatui::style::Style::default());
            }
            return;
        };
        if frame.width == 0 || frame.height == 0 || area.width == 0 || area.height == 0 {
            return;
        }

        // Each terminal cell displays 2 vertical pixels
        let frame_aspect = frame.width as f64 / frame.height as f64;
        let term_width = area.width as f64;
        let term_height = (area.height as f64) * 2.0;

        let (display_width, display_height) = if term_width / term_height > frame_aspect {
            let h = term_height;
            let w = h * frame_aspect;
            (w as u16, (h / 2.0) as u16)
        } else {
            let w = term_width;
            let h = w / frame_aspect;
            (w as u16, (h / 2.0) as u16)
        };
        if display_width == 0 || display_height == 0 {
            return;
        }

        let x_offset = area.x + (area.width.saturating_sub(display_width)) / 2;
        let y_offset = area.y + (area.height.saturating_sub(display_height)) / 2;

        let x_scale = frame.width as f64 / display_width as f64;
        let y_scale = frame.height as f64 / (display_height as f64 * 2.0);

        // Upper half (▀) takes the fg colour, lower half the bg
        for ty in 0..display_height {
            for tx in 0..display_width {
                let term_x = x_offset + tx;
                let term_y = y_offset + ty;

                if term_x >= area.x + area.width || term_y >= area.y + area.height {
                    continue;
                }

                let src_x = (tx as f64 * x_scale) as u32;
                let src_y_top = (ty as f64 * 2.0 * y_scale) as u32;
                let src_y_bottom = ((ty as f64 * 2.0 + 1.0) * y_scale) as u32;

                if let Some(cell) = buf.cell_mut((term_x, term_y)) {
                    cell.set_char('▀');
                    cell.set_fg(sample_pixel(frame, src_x, src_y_top));
                    cell.set_bg(sample_pixel(frame, src_x, src_y_bottom));
                }
            }
        }
    }
}

fn sample_pixel(frame: &Frame, x: u32, y: u32) -> Color {
    let [r, g, b] = frame.pixel(x.min(frame.width - 1), y.min(frame.height - 1));
    Color::Rgb(r, g, b)
}

/// Status bar widget
struct StatusBar<'a> {
    message: &'a str,
}

impl Widget for StatusBar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for x in area.x..area.x + area.width {
            if let Some(cell) = buf.cell_mut((x, area.y)) {
                cell.set_char(' ');
                cell.set_bg(Color::DarkGray);
            }
        }

        let text: String = self.message.chars().take(area.width as usize).collect();
        buf.set_string(
            area.x,
            area.y,
            text,
            ratatui::style::Style::default()
                .fg(Color::White)
                .bg(Color::DarkGray),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_keys() {
        let params = LiveParams::default();
        assert!(matches!(
            handle_key(KeyCode::Char('+'), &params),
            KeyOutcome::Updated(_)
        ));
        assert!((params.snapshot().scale - 1.1).abs() < 1e-5);

        handle_key(KeyCode::Char('-'), &params);
        assert!((params.snapshot().scale - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_offsets_stay_in_range() {
        let params = LiveParams::default();
        for _ in 0..30 {
            handle_key(KeyCode::Right, &params);
        }
        assert_eq!(params.snapshot().offset_x, 1.0);
    }

    #[test]
    fn test_kernel_keys_stay_odd() {
        let params = LiveParams::default();
        handle_key(KeyCode::Char(']'), &params);
        assert_eq!(params.snapshot().smooth_kernel, 23);
        for _ in 0..20 {
            handle_key(KeyCode::Char('['), &params);
        }
        assert_eq!(params.snapshot().smooth_kernel, MIN_KERNEL);
    }

    #[test]
    fn test_flip_message() {
        let params = LiveParams::default();
        assert_eq!(
            handle_key(KeyCode::Char('h'), &params),
            KeyOutcome::Updated("Flip horizontal: on | vertical: off".to_string())
        );
        assert!(params.snapshot().flip_horizontal);
    }

    #[test]
    fn test_resolution_preset_cycles() {
        let params = LiveParams::default();
        handle_key(KeyCode::Char('r'), &params);
        assert_eq!(params.snapshot().resolution(), (1920, 1080));
        handle_key(KeyCode::Char('r'), &params);
        assert_eq!(params.snapshot().resolution(), (640, 480));
    }

    #[test]
    fn test_control_keys() {
        let params = LiveParams::default();
        assert_eq!(handle_key(KeyCode::Char('q'), &params), KeyOutcome::Quit);
        assert_eq!(handle_key(KeyCode::Char('s'), &params), KeyOutcome::ToggleStream);
        assert_eq!(handle_key(KeyCode::Char('x'), &params), KeyOutcome::Ignored);
        assert_eq!(*params.snapshot(), CompositionParams::default());
    }

    #[test]
    fn test_next_preset_unknown_value() {
        assert_eq!(next_preset(FRAMERATES, 17), FRAMERATES[0]);
        assert_eq!(next_preset(FRAMERATES, 60), 15);
    }
}
