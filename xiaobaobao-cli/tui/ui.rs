use super::app::{log_prefix, LogKind, TuiApp};
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;
use unicode_width::UnicodeWidthChar;

pub fn draw(frame: &mut Frame, app: &mut TuiApp) {
    let is_zh = app.is_zh_language();
    let popup_lines = app.popup_lines();
    let vertical = build_layout(frame.area(), popup_lines.len());

    let status = Paragraph::new(app.status_line())
        .style(
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .block(Block::default().borders(Borders::NONE));
    frame.render_widget(status, vertical[0]);

    draw_transcript(frame, app, vertical[1], is_zh);

    let input_index = if popup_lines.is_empty() { 2 } else { 3 };

    if !popup_lines.is_empty() {
        let popup = Paragraph::new(popup_lines.join("\n"))
            .block(
                Block::default()
                    .title(if is_zh { " 命令 " } else { " Commands " })
                    .borders(Borders::ALL)
                    .style(Style::default().fg(Color::Gray)),
            )
            .wrap(Wrap { trim: true });
        frame.render_widget(popup, vertical[2]);
    }

    draw_input(frame, app, vertical[input_index], is_zh);
}

fn draw_transcript(frame: &mut Frame, app: &mut TuiApp, area: Rect, is_zh: bool) {
    let inner = inner_rect(area);
    let width = inner.width.max(1) as usize;
    let height = inner.height;

    let mut lines: Vec<Line> = Vec::new();
    for entry in app.logs() {
        let style = log_style(entry.kind);
        let prefix = log_prefix(entry.kind);
        for (index, raw) in entry.text.split('\n').enumerate() {
            let lead = if index == 0 { prefix } else { "   " };
            for wrapped in wrap_columns(&format!("{lead}{raw}"), width) {
                lines.push(Line::from(Span::styled(wrapped, style)));
            }
        }
    }

    let total = lines.len() as u16;
    let scroll = total
        .saturating_sub(height)
        .saturating_sub(app.scroll_from_bottom());
    let transcript = Paragraph::new(Text::from(lines))
        .block(
            Block::default()
                .title(if is_zh { " 会话 " } else { " Conversation " })
                .borders(Borders::ALL),
        )
        .scroll((scroll, 0));
    frame.render_widget(transcript, area);
}

fn draw_input(frame: &mut Frame, app: &TuiApp, area: Rect, is_zh: bool) {
    let inner = inner_rect(area);
    let width = inner.width.max(1) as usize;
    let wrapped = wrap_columns(app.input(), width);
    let cursor_y = wrapped.len().saturating_sub(1) as u16;
    let cursor_x = wrapped
        .last()
        .map(|line| display_width(line) as u16)
        .unwrap_or(0);

    let input = Paragraph::new(wrapped.join("\n"))
        .style(Style::default().fg(Color::Yellow))
        .block(
            Block::default()
                .title(if is_zh { " 输入 " } else { " Input " })
                .borders(Borders::ALL),
        );
    frame.render_widget(input, area);

    if inner.width > 0 && inner.height > 0 {
        let x = inner.x + cursor_x.min(inner.width.saturating_sub(1));
        let y = inner.y + cursor_y.min(inner.height.saturating_sub(1));
        frame.set_cursor_position((x, y));
    }
}

fn build_layout(area: Rect, popup_len: usize) -> Vec<Rect> {
    if popup_len == 0 {
        return Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(8),
                Constraint::Length(4),
            ])
            .split(area)
            .to_vec();
    }

    let popup_height = (popup_len as u16).min(7).saturating_add(2);
    Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(popup_height),
            Constraint::Length(4),
        ])
        .split(area)
        .to_vec()
}

fn inner_rect(rect: Rect) -> Rect {
    Rect {
        x: rect.x.saturating_add(1),
        y: rect.y.saturating_add(1),
        width: rect.width.saturating_sub(2),
        height: rect.height.saturating_sub(2),
    }
}

fn log_style(kind: LogKind) -> Style {
    match kind {
        LogKind::Info => Style::default().fg(Color::Gray).add_modifier(Modifier::DIM),
        LogKind::User => Style::default().fg(Color::LightBlue),
        LogKind::Assistant => Style::default().fg(Color::Green),
        LogKind::Error => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
    }
}

/// 按显示宽度硬换行；中文等宽字符占两列。
fn wrap_columns(text: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![text.to_string()];
    }
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0usize;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if current_width + ch_width > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current_width = 0;
        }
        current.push(ch);
        current_width += ch_width;
    }
    lines.push(current);
    lines
}

fn display_width(text: &str) -> usize {
    text.chars().map(|ch| ch.width().unwrap_or(0)).sum()
}
