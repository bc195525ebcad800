use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph},
    Frame,
};

use tillcache_core::resource::{offline_message, Phase, ResourceState};
use tillcache_core::utils::{format_bps, truncate_string};
use tillcache_core::{Cacheable, SyncIndicator, ToastLevel};

use crate::app::{App, AppState};

use super::styles;

pub fn render(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_main_content(frame, app, chunks[1]);
    render_status_bar(frame, app, chunks[2]);

    if matches!(app.state, AppState::ShowingHelp) {
        render_help_overlay(frame);
    }

    if matches!(app.state, AppState::ConfirmingQuit) {
        render_quit_overlay(frame, app);
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = match app.receipt_settings() {
        Some(settings) => format!("  tillcache - {}", settings.business_name),
        None => "  tillcache".to_string(),
    };
    let help_hint = "[?] Help";

    let title_line = Line::from(vec![
        Span::styled(title.clone(), styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize).saturating_sub(title.chars().count() + help_hint.len() + 4),
        )),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(9), Constraint::Min(6)])
        .split(columns[1]);

    render_catalogue(frame, app, columns[0]);
    render_settings(frame, app, right[0]);
    render_cart(frame, app, right[1]);
}

/// Placeholder line for a resource with nothing to show yet.
fn empty_state_line<T: Cacheable>(state: &ResourceState<T>, online: bool) -> Line<'static> {
    if let Some(ref error) = state.error {
        Line::from(Span::styled(format!(" {}", error), styles::error_style()))
    } else if !online && state.phase == Phase::Init {
        Line::from(Span::styled(
            format!(" {}", offline_message(T::label())),
            styles::error_style(),
        ))
    } else if state.loading {
        Line::from(Span::styled(" Loading...", styles::muted_style()))
    } else {
        Line::from(Span::styled(
            format!(" No {}", T::label()),
            styles::muted_style(),
        ))
    }
}

/// Block title with the cache age when the data is not live.
fn resource_title<T>(name: &str, state: &ResourceState<T>, stale_minutes: i64) -> String {
    match state.age_display() {
        Some(age) if state.is_stale_after(stale_minutes) => {
            format!(" {} (cached {}, stale) ", name, age)
        }
        Some(age) => format!(" {} (cached {}) ", name, age),
        None => format!(" {} ", name),
    }
}

fn render_catalogue(frame: &mut Frame, app: &App, area: Rect) {
    let state = &app.catalogue_state;
    let block = Block::default()
        .title(resource_title("Products", state, app.config.cache_stale_minutes))
        .borders(Borders::ALL)
        .border_style(styles::border_style(true));

    let products = app.products();
    if products.is_empty() {
        let line = empty_state_line(state, app.is_online());
        frame.render_widget(Paragraph::new(line).block(block), area);
        return;
    }

    let name_width = (area.width as usize).saturating_sub(16).max(8);
    let items: Vec<ListItem> = products
        .iter()
        .map(|p| {
            let style = if p.active {
                styles::list_item_style()
            } else {
                styles::muted_style()
            };
            let stock = match p.stock {
                Some(0) => " out".to_string(),
                Some(n) => format!(" x{}", n),
                None => String::new(),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!(" {:<width$}", truncate_string(&p.name, name_width), width = name_width),
                    style,
                ),
                Span::styled(format!("{:>9}", app.money(p.price_cents)), styles::highlight_style()),
                Span::styled(stock, styles::muted_style()),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(styles::selected_style());
    let mut list_state = ListState::default().with_selected(Some(app.selection));
    frame.render_stateful_widget(list, area, &mut list_state);
}

fn render_settings(frame: &mut Frame, app: &App, area: Rect) {
    let state = &app.settings_state;
    let block = Block::default()
        .title(resource_title("Receipt", state, app.config.cache_stale_minutes))
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    let Some(settings) = state.value.as_ref() else {
        let line = empty_state_line(state, app.is_online());
        frame.render_widget(Paragraph::new(line).block(block), area);
        return;
    };

    let mut lines = vec![Line::from(Span::styled(
        format!(" {}", settings.business_name),
        styles::title_style(),
    ))];
    if let Some(contact) = settings.contact_line() {
        lines.push(Line::from(Span::styled(format!(" {}", contact), styles::muted_style())));
    }
    if let Some(ref header) = settings.header_message {
        lines.push(Line::from(format!(" {}", header)));
    }
    lines.push(Line::from(vec![
        Span::styled(" Tax ", styles::muted_style()),
        Span::raw(format_bps(settings.tax_rate_bps)),
        Span::styled("  Paper ", styles::muted_style()),
        Span::raw(format!("{}mm", settings.paper_width_mm)),
        Span::styled("  Logo ", styles::muted_style()),
        Span::raw(if settings.show_logo { "on" } else { "off" }),
    ]));
    if let Some(ref footer) = settings.footer_message {
        lines.push(Line::from(Span::styled(format!(" {}", footer), styles::muted_style())));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_cart(frame: &mut Frame, app: &App, area: Rect) {
    let block = Block::default()
        .title(format!(" Cart - {} ", app.payment_method.display_name()))
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    let cart = &app.cart;
    let mut lines = Vec::new();

    if cart.is_empty() {
        lines.push(Line::from(Span::styled(" Empty", styles::muted_style())));
        if let Some(ref sale) = app.last_sale {
            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                format!(
                    " Last sale: {} item(s), {}",
                    sale.item_count(),
                    app.money(sale.total_cents)
                ),
                styles::success_style(),
            )));
        }
    } else {
        let name_width = (area.width as usize).saturating_sub(20).max(8);
        for item in cart.items() {
            lines.push(Line::from(vec![
                Span::raw(format!(
                    " {:>3} {:<width$}",
                    item.quantity,
                    truncate_string(&item.name, name_width),
                    width = name_width
                )),
                Span::styled(
                    format!("{:>10}", app.money(item.line_total_cents())),
                    styles::highlight_style(),
                ),
            ]));
        }

        let rate = app.tax_rate_bps();
        lines.push(Line::from(""));
        lines.push(total_line("Subtotal", app.money(cart.subtotal_cents())));
        if cart.discount_cents() > 0 {
            lines.push(total_line("Discount", format!("-{}", app.money(cart.discount_cents()))));
        }
        lines.push(total_line(&format!("Tax {}", format_bps(rate)), app.money(cart.tax_cents(rate))));
        lines.push(Line::from(vec![
            Span::styled(format!(" {:<14}", "Total"), styles::title_style()),
            Span::styled(app.money(cart.total_cents(rate)), styles::title_style()),
        ]));
    }

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn total_line(label: &str, amount: String) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!(" {:<14}", label), styles::muted_style()),
        Span::raw(amount),
    ])
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect) {
    let shortcuts = "[c]heckout | [s]ync | [q]uit";
    let mut spans = Vec::new();

    match app.indicator() {
        Some(SyncIndicator::Offline { pending_count }) => {
            spans.push(Span::styled(" Offline mode ", styles::offline_style()));
            if pending_count > 0 {
                spans.push(Span::styled(
                    format!(" {} pending ", pending_count),
                    styles::muted_style(),
                ));
            }
        }
        Some(indicator) => {
            spans.push(Span::styled(format!(" {} ", indicator.label()), styles::pending_style()));
            if let Some(action) = indicator.action_label() {
                let style = if indicator.sync_enabled() {
                    styles::help_key_style()
                } else {
                    styles::muted_style()
                };
                spans.push(Span::styled(format!(" [{}] ", action), style));
            }
        }
        None => {}
    }

    // Latest toast wins over the status message
    if let Some(toast) = app.toasts.back() {
        let style = match toast.level {
            ToastLevel::Info => styles::list_item_style(),
            ToastLevel::Success => styles::success_style(),
            ToastLevel::Error => styles::error_style(),
        };
        spans.push(Span::styled(format!(" {} ", toast.message), style));
    } else if let Some(ref msg) = app.status_message {
        spans.push(Span::styled(format!(" {} ", msg), styles::muted_style()));
    }

    let used: usize = spans.iter().map(|s| s.content.chars().count()).sum();
    let right_text = format!(" {} ", shortcuts);
    let padding = (area.width as usize)
        .saturating_sub(used)
        .saturating_sub(right_text.len());
    spans.push(Span::raw(" ".repeat(padding)));
    spans.push(Span::styled(right_text, styles::muted_style()));

    let paragraph = Paragraph::new(Line::from(spans)).style(styles::status_bar_style());
    frame.render_widget(paragraph, area);
}

fn help_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(format!("  {:<10}", key), styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(48, 20, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let help_text = vec![
        Line::from(Span::styled(
            format!("  tillcache {}", version),
            styles::title_style(),
        )),
        Line::from(""),
        Line::from(Span::styled(" Selling", styles::highlight_style())),
        help_line("↑/↓", "Select product"),
        help_line("a/Enter", "Add to cart"),
        help_line("-", "Remove one from cart"),
        help_line("x", "Clear cart"),
        help_line("p", "Cycle payment method"),
        help_line("c", "Check out"),
        Line::from(""),
        Line::from(Span::styled(" Data", styles::highlight_style())),
        help_line("r", "Refresh from backend"),
        help_line("s", "Sync pending changes"),
        help_line("l", "Toggle logo on receipts"),
        help_line("q", "Quit"),
        Line::from(""),
        Line::from(vec![
            Span::styled("       Press ", styles::muted_style()),
            Span::styled("?", styles::help_key_style()),
            Span::styled(" or ", styles::muted_style()),
            Span::styled("Esc", styles::help_key_style()),
            Span::styled(" to close", styles::muted_style()),
        ]),
    ];

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(help_text).block(block), area);
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn render_quit_overlay(frame: &mut Frame, app: &App) {
    let pending = app.pending_count();
    let height = if pending > 0 { 8 } else { 6 };
    let area = centered_rect_fixed(46, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![
        Line::from(""),
        Line::from(Span::styled(
            "   Are you sure you want to quit?",
            styles::highlight_style(),
        )),
    ];
    if pending > 0 {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(
            format!("   {} change(s) will sync next time", pending),
            styles::muted_style(),
        )));
    }
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::styled("   Press ", styles::muted_style()),
        Span::styled("[Y]", styles::help_key_style()),
        Span::styled(" to quit, ", styles::muted_style()),
        Span::styled("[N]", styles::help_key_style()),
        Span::styled(" to cancel", styles::muted_style()),
    ]));

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default());

    frame.render_widget(Paragraph::new(lines).block(block), area);
}
