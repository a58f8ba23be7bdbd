use anyhow::Result;
use ratatui::backend::Backend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Borders, Cell, List, ListItem, ListState, Paragraph, Row, Table, TableState};
use ratatui::{Frame, Terminal};
// Use Popup from tui-widgets to render modals
use tui_widgets::popup::Popup;

use crate::config::RgbColor;
use crate::controller::{FormField, View};
use crate::remote::CrmApi;

use super::app::App;
use super::edit::EditTarget;
use super::panes::{detail_fields, note_heading, ListColumn};

const LOADING_TEXT: &str = "Loading...";

pub fn render<B: Backend, C: CrmApi>(terminal: &mut Terminal<B>, app: &mut App<'_, C>) -> Result<()> {
    terminal.draw(|frame| draw_frame(frame, app))?;
    Ok(())
}

fn draw_frame<C: CrmApi>(frame: &mut Frame<'_>, app: &mut App<'_, C>) {
    let size = frame.area();
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(size);

    draw_header(frame, layout[0], app);
    match app.controller.view() {
        View::List => draw_list(frame, layout[1], app),
        View::Add | View::Edit => draw_form(frame, layout[1], app),
        View::Detail => draw_detail(frame, layout[1], app),
    }
    draw_footer(frame, layout[2], app);
    draw_confirm_modal(frame, size, app);
}

fn draw_header<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let title = match app.controller.view() {
        View::List => "CONTACTS",
        View::Add => "ADD CONTACT",
        View::Edit => "EDIT CONTACT",
        View::Detail => "CONTACT",
    };
    let help = help_text(app);
    let help_width = (help.chars().count() as u16).min(area.width);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Min(0), Constraint::Length(help_width)])
        .split(area);

    let left = Line::from(vec![
        Span::styled("KEAPDESK", header_text_style(app).add_modifier(Modifier::BOLD)),
        Span::styled(" | ", separator_style(app)),
        Span::styled(title, header_text_style(app)),
    ]);
    frame.render_widget(Paragraph::new(left), chunks[0]);
    frame.render_widget(
        Paragraph::new(help).alignment(Alignment::Right),
        chunks[1],
    );
}

fn help_text<C: CrmApi>(app: &App<'_, C>) -> String {
    let keys = &app.config().keys;
    if app.controller.confirm().is_some() {
        let modal = &keys.modal;
        return format!("{}: confirm  {}: cancel", modal.confirm.label(), modal.cancel.label());
    }
    match app.controller.view() {
        View::List if app.editor.is_editing(EditTarget::Search) => {
            let input = &keys.search_input;
            format!("{}: search  {}: cancel", input.confirm.label(), input.cancel.label())
        }
        View::List => {
            let list = &keys.list;
            format!(
                "{}: add  {}: view  {}: edit  {}: delete  {}: search  {}: clear  {}: quit",
                list.add.label(),
                list.view.label(),
                list.edit.label(),
                list.delete.label(),
                list.search.label(),
                list.clear_search.label(),
                list.quit.label()
            )
        }
        View::Add | View::Edit => {
            let form = &keys.form;
            format!(
                "{}: next  {}: save  {}: cancel",
                form.next_field.label(),
                form.submit.label(),
                form.cancel.label()
            )
        }
        View::Detail if app.editor.active => {
            let input = &keys.note_input;
            format!(
                "{}: title/body  {}: save note  {}: cancel",
                input.next_field.label(),
                input.submit.label(),
                input.cancel.label()
            )
        }
        View::Detail => {
            let detail = &keys.detail;
            format!(
                "{}: note  {}: edit note  {}: delete note  {}: edit  {}: refresh  {}: back",
                detail.note.label(),
                detail.edit_note.label(),
                detail.delete_note.label(),
                detail.edit.label(),
                detail.refresh.label(),
                detail.back.label()
            )
        }
    }
}

// -- list -------------------------------------------------------------------

fn draw_list<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .split(area);

    draw_search_box(frame, layout[0], app);
    draw_contact_table(frame, layout[1], app);
}

fn draw_search_box<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(" SEARCH ", header_text_style(app)));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let value = if app.editor.is_editing(EditTarget::Search) {
        app.editor.value()
    } else {
        app.controller.search_term()
    };
    let (line, cursor) = input_line(app, "", value, EditTarget::Search, 0);
    frame.render_widget(Paragraph::new(line), inner);
    if let Some(column) = cursor {
        frame.set_cursor_position((inner.x.saturating_add(column), inner.y));
    }
}

fn draw_contact_table<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let contacts = app.controller.contacts();
    let title = match app.controller.active_search() {
        Some(term) => format!(" CONTACTS ({}) matching \"{}\" ", contacts.len(), term),
        None => format!(" CONTACTS ({}) ", contacts.len()),
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(title, header_text_style(app)));

    if contacts.is_empty() {
        let text = if app.controller.loading() {
            LOADING_TEXT
        } else {
            "No contacts"
        };
        frame.render_widget(
            Paragraph::new(text).alignment(Alignment::Center).block(block),
            area,
        );
        return;
    }

    let header = Row::new(
        ListColumn::ALL
            .iter()
            .map(|column| Cell::from(column.title()))
            .collect::<Vec<_>>(),
    )
    .style(header_text_style(app));

    let rows = contacts.iter().map(|contact| {
        Row::new(
            ListColumn::ALL
                .iter()
                .map(|column| Cell::from(column.cell(contact)))
                .collect::<Vec<_>>(),
        )
    });
    let widths = ListColumn::ALL.map(|column| Constraint::Percentage(column.width()));

    let table = Table::new(rows, widths)
        .header(header)
        .block(block)
        .highlight_style(selection_style(app));

    let mut state = TableState::default();
    state.select(Some(app.controller.list_cursor()));
    frame.render_stateful_widget(table, area, &mut state);
}

// -- add / edit -------------------------------------------------------------

fn draw_form<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let title = if app.controller.view() == View::Add {
        " NEW CONTACT "
    } else {
        " EDIT CONTACT "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(title, header_text_style(app)));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let label_width = FormField::ALL
        .iter()
        .map(|field| form_label(*field).chars().count())
        .max()
        .unwrap_or(0)
        + 1;

    let mut lines = Vec::with_capacity(FormField::ALL.len());
    let mut cursor = None;
    for (row, field) in FormField::ALL.iter().enumerate() {
        let (line, column) = input_line(
            app,
            &form_label(*field),
            app.controller.form().get(*field),
            EditTarget::Field(*field),
            label_width,
        );
        if let Some(column) = column {
            cursor = Some((column, row as u16));
        }
        lines.push(line);
    }

    frame.render_widget(Paragraph::new(lines), inner);
    if let Some((column, row)) = cursor {
        if row < inner.height {
            frame.set_cursor_position((inner.x.saturating_add(column), inner.y + row));
        }
    }
}

fn form_label(field: FormField) -> String {
    if field.required() {
        format!("{}*", field.title())
    } else {
        field.title().to_string()
    }
}

// -- detail -----------------------------------------------------------------

fn draw_detail<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),
            Constraint::Length(4),
            Constraint::Min(0),
        ])
        .split(area);

    draw_contact_info(frame, layout[0], app);
    draw_note_form(frame, layout[1], app);
    draw_notes(frame, layout[2], app);
}

fn draw_contact_info<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(" CONTACT ", header_text_style(app)));

    let Some(contact) = app.controller.selected() else {
        frame.render_widget(Paragraph::new("No contact selected").block(block), area);
        return;
    };

    let fields = detail_fields(contact);
    let label_width = fields
        .iter()
        .map(|field| field.label.chars().count())
        .max()
        .unwrap_or(0)
        + 1;
    let lines: Vec<Line> = fields
        .iter()
        .map(|field| {
            let label = format!("{:width$} ", format!("{}:", field.label), width = label_width);
            Line::from(vec![
                Span::styled(label, header_text_style(app)),
                Span::raw(field.value.clone()),
            ])
        })
        .collect();

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn draw_note_form<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let title = if app.controller.editing_note().is_some() {
        " EDIT NOTE "
    } else {
        " ADD NOTE "
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(title, header_text_style(app)));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.width == 0 || inner.height == 0 {
        return;
    }

    let draft = app.controller.note_draft();
    let (title_line, title_cursor) = input_line(app, "Title", &draft.title, EditTarget::NoteTitle, 6);
    let (body_line, body_cursor) = input_line(app, "Body", &draft.body, EditTarget::NoteBody, 6);
    frame.render_widget(Paragraph::new(vec![title_line, body_line]), inner);

    let cursor = title_cursor
        .map(|column| (column, 0))
        .or(body_cursor.map(|column| (column, 1)));
    if let Some((column, row)) = cursor {
        if row < inner.height {
            frame.set_cursor_position((inner.x.saturating_add(column), inner.y + row));
        }
    }
}

fn draw_notes<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let notes = app.controller.notes();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(border_style(app))
        .title(Span::styled(
            format!(" NOTES ({}) ", notes.len()),
            header_text_style(app),
        ));

    if notes.is_empty() {
        let text = if app.controller.loading() {
            LOADING_TEXT
        } else {
            "No notes"
        };
        frame.render_widget(Paragraph::new(text).block(block), area);
        return;
    }

    let items: Vec<ListItem> = notes
        .iter()
        .map(|note| {
            let mut lines = vec![Line::from(Span::styled(
                note_heading(note),
                Style::default().add_modifier(Modifier::BOLD),
            ))];
            if let Some(body) = note.body.as_deref().filter(|b| !b.trim().is_empty()) {
                lines.push(Line::from(format!("  {}", body)));
            }
            ListItem::new(lines)
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(selection_style(app));

    let mut state = ListState::default();
    state.select(Some(app.controller.note_cursor()));
    frame.render_stateful_widget(list, area, &mut state);
}

// -- modal and footer -------------------------------------------------------

fn draw_confirm_modal<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &mut App<'_, C>) {
    let Some(confirm) = app.controller.confirm() else {
        return;
    };

    let modal = &app.config().keys.modal;
    let help = format!(
        "{}: confirm  {}: cancel",
        modal.confirm.keys().join("/"),
        modal.cancel.keys().join("/")
    );
    let body_text = Text::from(vec![
        Line::from(confirm.message.clone()),
        Line::from(""),
        Line::from(help),
    ]);

    let title_line = Line::from(Span::styled(confirm.title.clone(), header_text_style(app)));
    let popup = Popup::new(body_text)
        .title(title_line)
        .border_style(border_style(app));

    frame.render_stateful_widget_ref(popup, area, &mut app.modal_popup);
}

fn draw_footer<C: CrmApi>(frame: &mut Frame<'_>, area: Rect, app: &App<'_, C>) {
    let colors = app.ui_colors();
    let background = Block::default().style(Style::default().bg(color(colors.status_bg)));
    frame.render_widget(background, area);

    let (message, fg) = if let Some(error) = app.controller.error() {
        (error.to_string(), colors.error_fg)
    } else if app.controller.loading() {
        (LOADING_TEXT.to_string(), colors.status_fg)
    } else {
        (
            app.controller.status().unwrap_or("READY").to_string(),
            colors.status_fg,
        )
    };

    let style = Style::default().fg(color(fg)).bg(color(colors.status_bg));
    frame.render_widget(Paragraph::new(message).style(style), area);
}

// -- shared helpers ---------------------------------------------------------

/// A `label: value` line. When `target` is being edited the live editor value
/// is shown and the cursor column is returned.
fn input_line<C: CrmApi>(
    app: &App<'_, C>,
    label: &str,
    value: &str,
    target: EditTarget,
    label_width: usize,
) -> (Line<'static>, Option<u16>) {
    let editing = app.editor.is_editing(target);
    let (label_style, value_style) = line_styles(app, editing);

    let label = if label.is_empty() {
        String::new()
    } else {
        // Pad the label (including colon) to consistent width, then add space before value
        format!("{:width$} ", format!("{}:", label), width = label_width)
    };
    let mut spans = vec![Span::styled(label.clone(), label_style)];
    let mut cursor = None;

    if editing {
        let visual_label_width = Span::raw(&label).width();
        cursor = Some((visual_label_width + app.editor.visual_cursor()) as u16);
        spans.push(Span::styled(app.editor.value().to_string(), value_style));
    } else {
        spans.push(Span::styled(value.to_string(), value_style));
    }

    (Line::from(spans), cursor)
}

fn line_styles<C: CrmApi>(app: &App<'_, C>, highlight: bool) -> (Style, Style) {
    if highlight {
        let style = selection_style(app);
        (style, style)
    } else {
        (header_text_style(app), Style::default())
    }
}

fn selection_style<C: CrmApi>(app: &App<'_, C>) -> Style {
    let colors = app.ui_colors();
    Style::default()
        .fg(color(colors.selection_fg))
        .bg(color(colors.selection_bg))
}

fn border_style<C: CrmApi>(app: &App<'_, C>) -> Style {
    let colors = app.ui_colors();
    Style::default().fg(color(colors.border))
}

fn header_text_style<C: CrmApi>(app: &App<'_, C>) -> Style {
    let colors = app.ui_colors();
    Style::default().fg(color(colors.separator))
}

fn separator_style<C: CrmApi>(app: &App<'_, C>) -> Style {
    let colors = app.ui_colors();
    Style::default().fg(color(colors.separator))
}

fn color(rgb: RgbColor) -> Color {
    Color::Rgb(rgb.r, rgb.g, rgb.b)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ratatui::backend::TestBackend;
    use tokio::runtime::Runtime;

    use super::*;
    use crate::controller::{Completion, Reply};
    use crate::model::Contact;
    use crate::remote::fake::FakeApi;
    use crate::ui::testing::test_config;

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        let buffer = terminal.backend().buffer();
        buffer
            .content
            .chunks(buffer.area.width as usize)
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn load(app: &mut App<'_, FakeApi>, contacts: Vec<Contact>) {
        let task = app.controller.start().remove(0);
        app.controller.apply(Completion {
            seq: task.seq,
            request: task.request,
            result: Ok(Reply::Contacts(contacts)),
        });
    }

    fn bare_contact() -> Contact {
        Contact {
            id: Some(1),
            given_name: Some("Ada".into()),
            family_name: Some("Lovelace".into()),
            ..Contact::default()
        }
    }

    #[test]
    fn contact_without_details_renders_in_list_and_detail() {
        let runtime = Runtime::new().unwrap();
        let config = test_config();
        let mut app = App::new(&config, Arc::new(FakeApi::default()), runtime.handle().clone());
        load(&mut app, vec![bare_contact()]);

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        render(&mut terminal, &mut app).unwrap();
        let list = screen(&terminal);
        assert!(list.contains("Ada Lovelace"));
        assert!(list.contains("EMAIL"));
        assert!(!list.contains("N/A"));

        let _ = app.controller.view_row(0);
        render(&mut terminal, &mut app).unwrap();
        let detail = screen(&terminal);
        assert!(detail.contains("Ada Lovelace"));
        assert!(detail.contains("Email:"));
        assert!(detail.contains("N/A"));
        assert!(detail.contains("NOTES (0)"));
    }

    #[test]
    fn errors_replace_status_in_footer() {
        let runtime = Runtime::new().unwrap();
        let config = test_config();
        let mut app = App::new(&config, Arc::new(FakeApi::default()), runtime.handle().clone());
        app.controller.add_contact();
        let _ = app.controller.submit();

        let mut terminal = Terminal::new(TestBackend::new(80, 14)).unwrap();
        render(&mut terminal, &mut app).unwrap();
        let text = screen(&terminal);
        assert!(text.contains("First name is required"));
        assert!(text.contains("First Name*:"));
    }

    #[test]
    fn delete_confirmation_is_drawn_as_popup() {
        let runtime = Runtime::new().unwrap();
        let config = test_config();
        let mut app = App::new(&config, Arc::new(FakeApi::default()), runtime.handle().clone());
        load(&mut app, vec![bare_contact()]);
        app.controller.request_delete_row(0);

        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        render(&mut terminal, &mut app).unwrap();
        let text = screen(&terminal);
        assert!(text.contains("Delete contact"));
        assert!(text.contains("Delete Ada Lovelace?"));
    }
}
