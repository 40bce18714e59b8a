use anyhow::Result;
use chrono::NaiveDate;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use std::io::stdout;

use crate::filter::FilterState;
use crate::models::{ApplicationPatch, ApplicationRecord, Response};
use crate::pipeline::{derived_stage, Stage};
use crate::session::Session;
use crate::stats::Summary;

struct AppState {
    filter: FilterState,
    visible: Vec<ApplicationRecord>,
    selected: usize,
    scroll_offset: u16,
    message: Option<String>,
}

impl AppState {
    fn new(filter: FilterState) -> Self {
        Self {
            filter,
            visible: Vec::new(),
            selected: 0,
            scroll_offset: 0,
            message: None,
        }
    }

    fn refresh(&mut self, session: &Session) {
        self.visible = session.filtered(&self.filter).into_iter().cloned().collect();
        if self.selected >= self.visible.len() {
            self.selected = self.visible.len().saturating_sub(1);
        }
    }

    fn current(&self) -> Option<&ApplicationRecord> {
        self.visible.get(self.selected)
    }

    fn next(&mut self) {
        if !self.visible.is_empty() && self.selected < self.visible.len() - 1 {
            self.selected += 1;
            self.scroll_offset = 0;
        }
    }

    fn prev(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.scroll_offset = 0;
        }
    }

    fn scroll_down(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_add(3);
    }

    fn scroll_up(&mut self) {
        self.scroll_offset = self.scroll_offset.saturating_sub(3);
    }
}

/// Patch for a key press on `record`, if the key edits anything.
fn patch_for_key(code: KeyCode, record: &ApplicationRecord) -> Option<ApplicationPatch> {
    match code {
        KeyCode::Char(c @ '1'..='5') => {
            let index = c as usize - '1' as usize;
            Some(ApplicationPatch::new().response(Response::ALL[index]))
        }
        KeyCode::Char('a') => Some(ApplicationPatch::new().assessment(record.assessment.next())),
        KeyCode::Char('v') => Some(ApplicationPatch::new().interview(record.interview.next())),
        KeyCode::Char('d') => Some(ApplicationPatch::new().decision(record.decision.next())),
        _ => None,
    }
}

pub fn run_browse(session: &mut Session, filter: FilterState, today: NaiveDate) -> Result<()> {
    let mut state = AppState::new(filter);
    state.refresh(session);
    if state.visible.is_empty() {
        println!("No applications found.");
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;

    let result = run_loop(&mut terminal, &mut state, session, today);

    // Restore terminal
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    result
}

fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>,
    state: &mut AppState,
    session: &mut Session,
    today: NaiveDate,
) -> Result<()> {
    let mut list_state = ListState::default();
    list_state.select(Some(0));

    loop {
        let summary = session.summary();
        let user = session.identity().map(|i| {
            if i.display_name.is_empty() { i.user_id.clone() } else { i.display_name.clone() }
        });
        terminal.draw(|frame| draw(frame, state, &summary, user.as_deref(), &mut list_state))?;

        if let Event::Key(key) = event::read()? {
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => break,
                KeyCode::Down | KeyCode::Char('j') => state.next(),
                KeyCode::Up | KeyCode::Char('k') => state.prev(),
                KeyCode::Char('J') | KeyCode::PageDown => state.scroll_down(),
                KeyCode::Char('K') | KeyCode::PageUp => state.scroll_up(),
                KeyCode::Char('c') => {
                    state.filter.clear();
                    state.refresh(session);
                }
                code => {
                    let Some(record) = state.current() else { continue };
                    let Some(patch) = patch_for_key(code, record) else { continue };
                    let id = record.id.clone();
                    state.message = match session.update(&id, patch, today) {
                        Ok(()) => None,
                        Err(e) => Some(e.to_string()),
                    };
                    state.refresh(session);
                }
            }
            list_state.select(Some(state.selected));
        }
    }
    Ok(())
}

fn stage_style(stage: Stage) -> Style {
    match stage {
        Stage::Offered => Style::default().fg(Color::Green),
        Stage::Rejected | Stage::AssessmentFailed => Style::default().fg(Color::Red),
        Stage::NoResponse => Style::default().fg(Color::DarkGray),
        Stage::InterviewScheduled | Stage::InterviewPending => Style::default().fg(Color::Cyan),
        Stage::AssessmentPending | Stage::AssessmentPassed => Style::default().fg(Color::Yellow),
        Stage::AwaitingResponse | Stage::Applied => Style::default(),
    }
}

fn stage_icon(stage: Stage) -> &'static str {
    match stage {
        Stage::Offered => "$",
        Stage::Rejected | Stage::AssessmentFailed => "x",
        Stage::NoResponse => "-",
        Stage::InterviewScheduled | Stage::InterviewPending => "+",
        Stage::AssessmentPending | Stage::AssessmentPassed => "*",
        Stage::AwaitingResponse | Stage::Applied => " ",
    }
}

fn draw(
    frame: &mut Frame,
    state: &AppState,
    summary: &Summary,
    user: Option<&str>,
    list_state: &mut ListState,
) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
        ])
        .split(frame.area());

    let header = Paragraph::new(format!(
        " {} total  {} active  responses {}%  interviews {}%  offers {}  rejected {}",
        summary.total,
        summary.active,
        summary.response_rate,
        summary.interview_rate,
        summary.offered,
        summary.rejected
    ))
    .block(Block::default().borders(Borders::ALL).title(match user {
        Some(user) => format!(" Summary: {} ", user),
        None => " Summary: local session ".to_string(),
    }));
    frame.render_widget(header, rows[0]);

    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(40), Constraint::Percentage(60)])
        .split(rows[1]);

    // Left panel: application list
    let items: Vec<ListItem> = state
        .visible
        .iter()
        .map(|record| {
            let stage = derived_stage(record);
            let title = if record.title.chars().count() > 30 {
                format!("{}...", record.title.chars().take(27).collect::<String>())
            } else {
                record.title.clone()
            };
            let mut style = stage_style(stage);
            if stage.is_closed() {
                style = style.add_modifier(Modifier::DIM);
            }
            ListItem::new(format!("{} {} | {}", stage_icon(stage), title, record.company)).style(style)
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(if state.filter.is_active() {
                    format!(" Applications ({}, filtered, c:clear) ", state.visible.len())
                } else {
                    format!(" Applications ({}) ", state.visible.len())
                }),
        )
        .highlight_style(Style::default().bg(Color::DarkGray).add_modifier(Modifier::BOLD))
        .highlight_symbol("> ");
    frame.render_stateful_widget(list, chunks[0], list_state);

    // Right panel: detail
    let detail = Paragraph::new(build_detail(state))
        .block(Block::default().borders(Borders::ALL).title(" Detail "))
        .wrap(Wrap { trim: false })
        .scroll((state.scroll_offset, 0));
    frame.render_widget(detail, chunks[1]);

    let footer = match &state.message {
        Some(message) => Paragraph::new(format!(" {}", message)).style(Style::default().fg(Color::Red)),
        None => Paragraph::new(
            " j/k:move J/K:scroll 1-5:waiting/assessment/interview/rejection/no-response a:assess v:interview d:decision q:quit",
        )
        .style(Style::default().fg(Color::DarkGray)),
    };
    frame.render_widget(footer, rows[2]);
}

fn build_detail(state: &AppState) -> Text<'_> {
    let Some(record) = state.current() else {
        return Text::raw("No application selected");
    };

    let stage = derived_stage(record);
    let mut lines: Vec<Line> = vec![
        Line::from(Span::styled(
            record.title.as_str(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(format!("at {}", record.company)),
        Line::from(Span::styled(format!("Stage: {}", stage), stage_style(stage))),
        Line::from(""),
        Line::from(format!("Applied:    {}", record.applied_date)),
        Line::from(format!("Response:   {}", record.response)),
    ];
    if let Some(date) = record.response_date {
        lines.push(Line::from(format!("Responded:  {}", date)));
    }
    lines.push(Line::from(format!("Assessment: {}", record.assessment)));
    lines.push(Line::from(format!("Interview:  {}", record.interview)));
    lines.push(Line::from(format!("Decision:   {}", record.decision)));

    if !record.job_link.is_empty() {
        lines.push(Line::from(format!("Link: {}", record.job_link)));
    }

    lines.push(Line::from(""));
    if record.description.is_empty() {
        lines.push(Line::from(Span::styled(
            "(No description)",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        lines.push(Line::from(Span::styled(
            "Description",
            Style::default().add_modifier(Modifier::BOLD),
        )));
        for line in textwrap::fill(&record.description, 70).lines() {
            lines.push(Line::from(format!("  {}", line)));
        }
    }

    Text::from(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{sample_record, Assessment, Decision, Interview};

    #[test]
    fn test_number_keys_set_response() {
        let record = sample_record("a1", "2025-01-01");
        let patch = patch_for_key(KeyCode::Char('5'), &record).unwrap();
        assert_eq!(patch.response, Some(Response::NoResponse));
        let patch = patch_for_key(KeyCode::Char('1'), &record).unwrap();
        assert_eq!(patch.response, Some(Response::Waiting));
    }

    #[test]
    fn test_letter_keys_cycle_pipeline_fields() {
        let mut record = sample_record("a1", "2025-01-01");
        record.assessment = Assessment::Failed;
        record.interview = Interview::Scheduled;

        let patch = patch_for_key(KeyCode::Char('a'), &record).unwrap();
        assert_eq!(patch.assessment, Some(Assessment::NotApplicable));
        let patch = patch_for_key(KeyCode::Char('v'), &record).unwrap();
        assert_eq!(patch.interview, Some(Interview::NotScheduled));
        let patch = patch_for_key(KeyCode::Char('d'), &record).unwrap();
        assert_eq!(patch.decision, Some(Decision::Offered));
    }

    #[test]
    fn test_other_keys_do_nothing() {
        let record = sample_record("a1", "2025-01-01");
        assert!(patch_for_key(KeyCode::Char('z'), &record).is_none());
        assert!(patch_for_key(KeyCode::Char('9'), &record).is_none());
    }

    #[test]
    fn test_refresh_clamps_selection() {
        let mut session = Session::anonymous(vec![
            sample_record("a1", "2025-01-01"),
            sample_record("a2", "2025-01-02"),
        ]);
        let mut state = AppState::new(FilterState::default());
        state.refresh(&session);
        state.next();
        assert_eq!(state.selected, 1);

        session.delete("a1").unwrap();
        state.refresh(&session);
        assert_eq!(state.selected, 0);
        assert_eq!(state.current().unwrap().id, "a2");
    }
}
