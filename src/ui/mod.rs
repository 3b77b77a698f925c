use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
    Frame,
};

use crate::app::{message_prefix_len, App, ListMode, RoomListView, RoomView, SignInField, SignInForm, View};
use crate::auth::SignInState;
use crate::rooms::{Message, StreamState};

pub fn draw(f: &mut Frame, app: &App) {
    let size = f.size();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Min(0),    // Screen
            Constraint::Length(1), // Status line
        ])
        .split(size);

    draw_title_bar(f, app, chunks[0]);

    match &app.view {
        View::SignIn(form) => draw_sign_in(f, app, form, chunks[1]),
        View::Restoring => draw_restoring(f, chunks[1]),
        View::Rooms(list) => draw_room_list(f, list, chunks[1]),
        View::Room(view) => draw_room(f, app, view, chunks[1]),
    }

    draw_status_line(f, app, chunks[2]);
}

fn draw_title_bar(f: &mut Frame, app: &App, area: Rect) {
    let location = match &app.view {
        View::SignIn(_) | View::Restoring => "sign in".to_string(),
        View::Rooms(_) => "rooms".to_string(),
        View::Room(view) => format!("#{}", view.room),
    };
    let user = app.current_identity_name().unwrap_or("anonymous");
    let title = format!(" {} | {} | {} ", user, location, app.backend_label);

    let title_block = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Cyan))
        .title(" roomchat ");

    let title_paragraph = Paragraph::new(title)
        .block(title_block)
        .alignment(Alignment::Center);

    f.render_widget(title_paragraph, area);
}

fn draw_status_line(f: &mut Frame, app: &App, area: Rect) {
    let hint = match &app.view {
        View::SignIn(_) => "TAB=switch field  ENTER=sign in  ESC=quit",
        View::Restoring => "q=quit",
        View::Rooms(list) => match list.mode {
            ListMode::Browse => "ENTER=open  /=search  n=new room  o=sign out  q=quit",
            ListMode::Search => "type to filter  ENTER/ESC=done",
            ListMode::Create(_) => "ENTER=create  ESC=cancel",
        },
        View::Room(_) => "ENTER=send  UP/DOWN=scroll  ESC=rooms",
    };

    let mut spans = vec![Span::styled(hint, Style::default().fg(Color::DarkGray))];
    if let Some(last) = app.status_messages.last() {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(last.as_str(), Style::default().fg(Color::Yellow)));
    }
    f.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_sign_in(f: &mut Frame, app: &App, form: &SignInForm, area: Rect) {
    let area = centered(area, 50, 11);
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" Sign in ")
        .style(Style::default().fg(Color::Blue));
    let inner = block.inner(area);
    f.render_widget(block, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Login
            Constraint::Length(3), // Secret
            Constraint::Min(0),    // State
        ])
        .split(inner);

    let masked = "*".repeat(form.secret.chars().count());
    draw_field(f, "Login", &form.login, form.focus == SignInField::Login, chunks[0]);
    draw_field(f, "Password", &masked, form.focus == SignInField::Secret, chunks[1]);

    let state = match app.gate.state() {
        SignInState::Idle => Line::from(""),
        SignInState::Loading => Line::from(Span::styled(
            "Signing in...",
            Style::default().fg(Color::Yellow),
        )),
        SignInState::Failed(message) => Line::from(Span::styled(
            message.as_str(),
            Style::default().fg(Color::Red),
        )),
    };
    f.render_widget(Paragraph::new(state).alignment(Alignment::Center), chunks[2]);

    let (field, rect) = match form.focus {
        SignInField::Login => (&form.login, chunks[0]),
        SignInField::Secret => (&form.secret, chunks[1]),
    };
    f.set_cursor(rect.x + field.chars().count() as u16 + 1, rect.y + 1);
}

fn draw_restoring(f: &mut Frame, area: Rect) {
    let area = centered(area, 40, 3);
    let block = Block::default()
        .borders(Borders::ALL)
        .style(Style::default().fg(Color::Blue));
    let paragraph = Paragraph::new(Span::styled(
        "Restoring session...",
        Style::default().fg(Color::Yellow),
    ))
    .block(block)
    .alignment(Alignment::Center);
    f.render_widget(paragraph, area);
}

fn draw_field(f: &mut Frame, label: &str, value: &str, focused: bool, area: Rect) {
    let style = if focused {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::White)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" {} ", label))
        .style(style);
    f.render_widget(Paragraph::new(value).block(block), area);
}

fn draw_room_list(f: &mut Frame, list: &RoomListView, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Search or new room form
            Constraint::Min(0),    // Rooms
        ])
        .split(area);

    match &list.mode {
        ListMode::Create(name) => {
            let title = match &list.error {
                Some(error) => format!(" New room: {} ", error),
                None => " New room ".to_string(),
            };
            let color = if list.error.is_some() { Color::Red } else { Color::Green };
            let block = Block::default()
                .borders(Borders::ALL)
                .title(title)
                .style(Style::default().fg(color));
            f.render_widget(Paragraph::new(name.as_str()).block(block), chunks[0]);
            f.set_cursor(chunks[0].x + name.chars().count() as u16 + 1, chunks[0].y + 1);
        }
        mode => {
            let searching = *mode == ListMode::Search;
            let block = Block::default()
                .borders(Borders::ALL)
                .title(" Search ")
                .style(Style::default().fg(if searching { Color::Green } else { Color::White }));
            f.render_widget(Paragraph::new(list.search.as_str()).block(block), chunks[0]);
            if searching {
                f.set_cursor(chunks[0].x + list.search.chars().count() as u16 + 1, chunks[0].y + 1);
            }
        }
    }

    let visible = list.visible_rooms();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(format!(" Rooms ({}) ", visible.len()))
        .style(Style::default().fg(Color::Blue));

    if visible.is_empty() {
        let hint = if list.loading {
            "Loading rooms..."
        } else if list.rooms.is_empty() {
            "No rooms yet. Press 'n' to create one."
        } else {
            "No rooms match your search."
        };
        let paragraph = Paragraph::new(Span::styled(
            hint,
            Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
        ))
        .block(block);
        f.render_widget(paragraph, chunks[1]);
        return;
    }

    let items: Vec<ListItem> = visible
        .iter()
        .map(|room| ListItem::new(format!("#{}", room)).style(Style::default().fg(Color::White)))
        .collect();
    let rooms = List::new(items)
        .block(block)
        .highlight_style(Style::default().fg(Color::Green).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    let mut state = ListState::default().with_selected(Some(list.selected));
    f.render_stateful_widget(rooms, chunks[1], &mut state);
}

fn draw_room(f: &mut Frame, app: &App, view: &RoomView, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(0),    // Messages
            Constraint::Length(3), // Composer
        ])
        .split(area);

    let (title, color) = match &view.state {
        StreamState::Subscribing => (format!(" #{} (loading) ", view.room), Color::Yellow),
        StreamState::Streaming => (format!(" #{} ", view.room), Color::Cyan),
        StreamState::DegradedFallback => (format!(" #{} (unindexed) ", view.room), Color::Yellow),
        StreamState::Error(message) => (format!(" #{} ({}) ", view.room, message), Color::Red),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title)
        .style(Style::default().fg(color));
    let inner = block.inner(chunks[0]);
    f.render_widget(block, chunks[0]);

    let own_name = app.current_identity_name();
    let width = inner.width as usize;
    let mut lines = Vec::new();
    for message in app.get_visible_messages(inner.height as usize, width) {
        let nick_color = if own_name == Some(message.author.as_str()) {
            Color::Green
        } else {
            Color::Magenta
        };
        lines.extend(message_lines(message, width, nick_color));
    }

    if lines.is_empty() {
        let (hint, style) = match &view.error {
            Some(error) => (error.as_str(), Style::default().fg(Color::Red)),
            None if view.state == StreamState::Subscribing => (
                "Loading messages...",
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            ),
            None => (
                "No messages in this room yet. Type a message and press Enter to send.",
                Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC),
            ),
        };
        lines.push(Line::from(Span::styled(hint, style)));
    }

    if view.messages.is_empty() {
        f.render_widget(Paragraph::new(lines).wrap(Wrap { trim: false }), inner);
    } else {
        // Bottom-align; a single oversized message shows its tail.
        let overflow = lines.len().saturating_sub(inner.height as usize);
        f.render_widget(Paragraph::new(lines).scroll((overflow as u16, 0)), inner);
    }

    draw_composer(f, view, chunks[1]);
}

/// Hard-wrapped rows of one message, matching `app::message_rows`.
fn message_lines<'a>(message: &Message, width: usize, nick_color: Color) -> Vec<Line<'a>> {
    let width = width.max(1);
    let timestamp = message
        .created_at
        .resolved()
        .map(|at| at.with_timezone(&chrono::Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| " ".repeat(8));

    let text: Vec<char> = message.text.chars().collect();
    let head_len = text.len().min(width.saturating_sub(message_prefix_len(message)));
    let (head, rest) = text.split_at(head_len);

    let mut lines = vec![Line::from(vec![
        Span::styled(format!("[{}] ", timestamp), Style::default().fg(Color::Gray)),
        Span::styled(format!("<{}> ", message.author), Style::default().fg(nick_color)),
        Span::raw(head.iter().collect::<String>()),
    ])];
    lines.extend(rest.chunks(width).map(|chunk| Line::from(chunk.iter().collect::<String>())));
    lines
}

fn draw_composer(f: &mut Frame, view: &RoomView, area: Rect) {
    let composer = &view.composer;
    let (title, style) = match &composer.error {
        Some(error) => (format!(" {} ", error), Style::default().fg(Color::Red)),
        None if composer.is_pending() => (" Sending... ".to_string(), Style::default().fg(Color::Yellow)),
        None => (" Message ".to_string(), Style::default().fg(Color::Green)),
    };

    let input_block = Block::default().borders(Borders::ALL).title(title).style(style);
    let input_paragraph = Paragraph::new(composer.input.as_str()).block(input_block);
    f.render_widget(input_paragraph, area);

    f.set_cursor(area.x + composer.cursor_position as u16 + 1, area.y + 1);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}
