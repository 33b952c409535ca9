//! Pairing QR rendering for the terminal.

use crate::channels::options::QrDisplay;

/// Render a QR code with Unicode half blocks, two module rows per text line.
pub fn render_terminal(data: &str) -> Result<String, String> {
    use qrcode::{Color, EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::L)
        .map_err(|e| format!("qr generation failed: {}", e))?;
    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::new();
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }
    Ok(out)
}

/// Show a pairing code according to the configured display mode.
pub fn show_pairing_code(mode: QrDisplay, code: &str) {
    match mode {
        QrDisplay::Terminal => match render_terminal(code) {
            Ok(rendered) => eprintln!("scan this code with WhatsApp on your phone:\n{}", rendered),
            Err(e) => log::warn!("{}", e),
        },
        QrDisplay::Log => log::info!("pairing code: {}", code),
        QrDisplay::Off => log::debug!("pairing code received (qr display off)"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendered_qr_is_half_height() {
        let out = render_terminal("2@abcdef,ghijkl,mnopqr").unwrap();
        let lines: Vec<&str> = out.lines().collect();
        let width = lines[0].chars().count();
        assert_eq!(lines.len(), width.div_ceil(2));
        assert!(lines.iter().all(|l| l.chars().count() == width));
        assert!(out.contains('█'));
    }
}
