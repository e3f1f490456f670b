use crate::ui::app::{App, AppState, Row};
use humansize::{BINARY, format_size};
use ratatui::{
    prelude::*,
    widgets::{BarChart, Block, Borders, Clear, Gauge, List, ListItem, Paragraph, Wrap},
};
use std::fmt::Write as _;

const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn render_header(f: &mut Frame, app: &App, area: Rect) {
    let home = app.engine().home();
    let disk_info = app
        .disks
        .list()
        .iter()
        .filter(|d| home.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().components().count());

    let mut header_text = match disk_info {
        Some(disk) if disk.total_space() > 0 => {
            let total = disk.total_space();
            let used = total.saturating_sub(disk.available_space());
            #[allow(clippy::cast_precision_loss)]
            let percent = used as f64 / total as f64 * 100.0;
            format!(
                "houki v{VERSION} | {} of {} used ({percent:.1}%)",
                format_size(used, BINARY),
                format_size(total, BINARY)
            )
        }
        _ => format!("houki v{VERSION} | disk usage unavailable"),
    };

    let engine = app.engine();
    let operations = engine.history().len();
    if operations > 0 {
        let _ = write!(
            header_text,
            "\nFreed so far: {} over {operations} operation(s), {}% successful",
            format_size(engine.total_space_freed(), BINARY),
            engine.success_rate()
        );
    }

    let title = Paragraph::new(header_text).block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

pub fn render_scanning(f: &mut Frame, app: &App, area: Rect) {
    let (ratio, label) = app
        .progress
        .as_ref()
        .map_or((0.0, "Starting..."), |p| (p.fraction, p.current.as_str()));
    let gauge = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Scanning"))
        .gauge_style(Style::default().fg(Color::Cyan))
        .ratio(ratio.clamp(0.0, 1.0))
        .label(label.to_string());
    let gauge_area = Rect {
        height: area.height.min(3),
        ..area
    };
    f.render_widget(gauge, gauge_area);
}

pub fn render_categories_list(f: &mut Frame, app: &mut App, area: Rect) {
    let items: Vec<ListItem> = app
        .rows
        .iter()
        .map(|row| match *row {
            Row::Category(ci) => {
                let c = &app.categories[ci];
                let checkbox = if c.all_selected() {
                    "[x]"
                } else if c.selected_count() > 0 {
                    "[-]"
                } else {
                    "[ ]"
                };
                let content = format!(
                    "{checkbox} {:<24}  {:>10}",
                    c.name,
                    format_size(c.total_size(), BINARY)
                );
                ListItem::new(content).style(Style::default().add_modifier(Modifier::BOLD))
            }
            Row::Item(ci, ii) => {
                let item = &app.categories[ci].items[ii];
                let checkbox = if item.is_selected { "[x]" } else { "[ ]" };
                ListItem::new(format!(
                    "    {checkbox} {:<20}  {:>10}",
                    item.name,
                    format_size(item.size, BINARY)
                ))
            }
        })
        .collect();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Categories"))
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .fg(Color::Yellow),
        )
        .highlight_symbol("> ");
    f.render_stateful_widget(list, area, &mut app.list_state);
}

pub fn render_usage_chart(f: &mut Frame, app: &App, area: Rect) {
    let labels: Vec<String> = app
        .categories
        .iter()
        .map(|c| c.name.chars().take(8).collect())
        .collect();
    let data: Vec<(&str, u64)> = labels
        .iter()
        .zip(&app.categories)
        .map(|(label, c)| (label.as_str(), c.total_size() / 1_000_000))
        .collect();

    let barchart = BarChart::default()
        .block(
            Block::default()
                .title("Reclaimable (MB)")
                .borders(Borders::ALL),
        )
        .data(&data)
        .bar_width(8)
        .bar_gap(2)
        .bar_style(Style::default().fg(Color::Cyan))
        .value_style(Style::default().fg(Color::White).bg(Color::Cyan));

    f.render_widget(barchart, area);
}

pub fn render_details_text(f: &mut Frame, app: &App, area: Rect) {
    let Some(category) = app.current_category() else {
        f.render_widget(
            Block::default().borders(Borders::ALL).title("Details"),
            area,
        );
        return;
    };

    let mut text = String::new();
    if let Some(warning) = &category.warning {
        let _ = writeln!(text, "Warning: {warning}\n");
    }
    for item in &category.items {
        let _ = writeln!(
            text,
            " - {} ({}, {} files)\n   {}",
            item.name,
            format_size(item.size, BINARY),
            item.file_count,
            item.path.display()
        );
        if item.size < item.total_size {
            let _ = writeln!(
                text,
                "   {} total, newer files kept",
                format_size(item.total_size, BINARY)
            );
        }
    }

    let details = Paragraph::new(text)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!("Details: {}", category.name)),
        )
        .wrap(Wrap { trim: false });
    f.render_widget(details, area);
}

pub fn render_details(f: &mut Frame, app: &App, area: Rect) {
    let right_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(area);

    render_usage_chart(f, app, right_chunks[0]);
    render_details_text(f, app, right_chunks[1]);
}

pub fn render_footer(f: &mut Frame, app: &App, area: Rect) {
    let total_selected = format_size(app.total_selected_size(), BINARY);
    let footer_text = match app.state {
        AppState::Browsing => format!(
            "Selected: {total_selected} | [Space] Toggle [a] Category [A/N] All/None [p] Preview [Enter] Clean [q] Quit"
        ),
        AppState::Confirming => format!(
            "MOVE TO TRASH? Selected: {total_selected} | [y/Enter] Confirm [n/Esc] Cancel"
        ),
        AppState::Scanning => "Scanning... [q] Quit".to_string(),
        AppState::Planning => "Building preview...".to_string(),
        AppState::Previewing(_) => "Preview only, nothing moved | [Esc] Back".to_string(),
        AppState::Cleaning => "Cleaning... (This may take a while)".to_string(),
        AppState::Done(_) => "Done! [Press key to continue]".to_string(),
    };

    let footer = Paragraph::new(footer_text).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}

pub fn render_popup(f: &mut Frame, app: &App) {
    let (title, body) = match &app.state {
        AppState::Done(msg) => ("Clean Completed", msg.clone()),
        AppState::Confirming => {
            let mut body = format!(
                "{} item(s), {} will be moved to the Trash.\n",
                app.total_selected_count(),
                format_size(app.total_selected_size(), BINARY)
            );
            for category in &app.categories {
                if category.selected_count() > 0
                    && let Some(warning) = &category.warning
                {
                    let _ = writeln!(body, "\n{}: {warning}", category.name);
                }
            }
            ("Confirm", body)
        }
        AppState::Previewing(results) => {
            let mut body = String::new();
            if results.is_empty() {
                body.push_str("Nothing eligible to clean.");
            }
            for result in results {
                let _ = writeln!(
                    body,
                    "{} / {}: {} files, {}",
                    result.category_name,
                    result.item_name,
                    result.total_files,
                    format_size(result.total_size, BINARY)
                );
                for file in result.files.iter().take(5) {
                    let _ = writeln!(
                        body,
                        "   {} ({})",
                        file.path.display(),
                        format_size(file.size, BINARY)
                    );
                }
            }
            ("Dry Run", body)
        }
        _ => return,
    };

    let block = Block::default().title(title).borders(Borders::ALL);
    let area = centered_rect(70, 50, f.area());
    f.render_widget(Clear, area);
    f.render_widget(
        Paragraph::new(body).block(block).wrap(Wrap { trim: true }),
        area,
    );
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
