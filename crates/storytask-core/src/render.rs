use std::collections::HashMap;
use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::bucket::{Bucket, Section};
use crate::config::Config;
use crate::datetime::format_deadline;
use crate::task::{Project, ProjectId, StoryPoints, Task, TaskColor};

const ID_WIDTH: usize = 8;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        if !color || !io::stdout().is_terminal() {
            return Ok(Self::plain());
        }
        Ok(Self { color: true })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip_all)]
    pub fn print_board(
        &self,
        sections: &[Section<'_>],
        projects: &[Project],
        todo: usize,
        done: usize,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_board(&mut out, sections, projects, todo, done)
    }

    pub fn write_board<W: Write>(
        &self,
        out: &mut W,
        sections: &[Section<'_>],
        projects: &[Project],
        todo: usize,
        done: usize,
    ) -> anyhow::Result<()> {
        writeln!(out, "{todo} todo, {done} done")?;

        let names: HashMap<&ProjectId, &str> = projects
            .iter()
            .map(|project| (&project.id, project.name.as_str()))
            .collect();

        for section in sections {
            writeln!(out)?;
            let heading = format!("{} ({})", section.bucket.title(), section.tasks.len());
            let heading = match section.bucket {
                Bucket::Overdue => self.paint(&heading, "31"),
                Bucket::Today => self.paint(&heading, "1"),
                _ => heading,
            };
            writeln!(out, "{heading}")?;

            if section.tasks.is_empty() {
                continue;
            }

            let rows = section
                .tasks
                .iter()
                .map(|task| {
                    let project = task
                        .project_id
                        .as_ref()
                        .and_then(|id| names.get(id).copied())
                        .unwrap_or("-");
                    vec![
                        self.paint(short_id(&task.id.0), "33"),
                        format_deadline(task.deadline),
                        project.to_string(),
                        format_points(task.points),
                        self.paint_title(task),
                    ]
                })
                .collect();

            write_table(
                &mut *out,
                vec!["ID", "Due", "Project", "Pts", "Title"],
                rows,
            )?;
        }

        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn print_done(&self, tasks: &[&Task]) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if tasks.is_empty() {
            writeln!(out, "nothing completed yet")?;
            return Ok(());
        }

        let rows = tasks
            .iter()
            .map(|task| {
                let completed = task
                    .completed_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                vec![
                    self.paint(short_id(&task.id.0), "33"),
                    completed,
                    task.title.clone(),
                ]
            })
            .collect();
        write_table(&mut out, vec!["ID", "Completed", "Title"], rows)
    }

    #[tracing::instrument(skip_all)]
    pub fn print_projects(
        &self,
        projects: &[Project],
        usage: &HashMap<&ProjectId, usize>,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        if projects.is_empty() {
            writeln!(out, "no projects")?;
            return Ok(());
        }

        let rows = projects
            .iter()
            .map(|project| {
                vec![
                    self.paint(short_id(&project.id.0), "33"),
                    project.name.clone(),
                    usage.get(&project.id).copied().unwrap_or(0).to_string(),
                    project.color.clone(),
                    project.description.clone().unwrap_or_default(),
                ]
            })
            .collect();
        write_table(
            &mut out,
            vec!["ID", "Name", "Tasks", "Color", "Description"],
            rows,
        )
    }

    fn paint_title(&self, task: &Task) -> String {
        let code = match task.color {
            TaskColor::Red => "31",
            TaskColor::Yellow => "33",
            TaskColor::Blue => "34",
        };
        self.paint(&task.title, code)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn short_id(id: &str) -> &str {
    match id.char_indices().nth(ID_WIDTH) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}

fn format_points(points: Option<StoryPoints>) -> String {
    points
        .map(|p| p.get().to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<&str>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(*header));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (idx, header) in headers.iter().enumerate() {
        write!(writer, "{:width$} ", header, width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_titles_are_padded_by_display_width() {
        let mut buf = Vec::new();
        write_table(
            &mut buf,
            vec!["ID", "Title"],
            vec![
                vec!["a".to_string(), "撰寫文件".to_string()],
                vec!["b".to_string(), "ship".to_string()],
            ],
        )
        .expect("write table");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "ID Title    ");
        assert_eq!(lines[3], "b  ship     ");
    }

    #[test]
    fn board_lists_sections_with_project_names() {
        use chrono::{NaiveDate, TimeZone, Utc};

        use crate::task::{TaskId, TaskStatus};

        let created = Utc
            .with_ymd_and_hms(2024, 6, 1, 8, 0, 0)
            .single()
            .expect("valid timestamp");
        let project = Project {
            id: ProjectId("p-home".to_string()),
            name: "Home".to_string(),
            description: None,
            color: "#1f7a8c".to_string(),
            created_at: created,
        };
        let task = Task {
            id: TaskId("0123456789".to_string()),
            title: "Fix the gate".to_string(),
            story: None,
            created_at: created,
            completed_at: None,
            color: TaskColor::Blue,
            position: 1000.0,
            deadline: NaiveDate::from_ymd_opt(2024, 6, 12),
            status: TaskStatus::Todo,
            project_id: Some(project.id.clone()),
            points: StoryPoints::try_from(5).ok(),
        };
        let sections = vec![
            Section {
                bucket: Bucket::Today,
                tasks: vec![&task],
            },
            Section {
                bucket: Bucket::ThisWeek,
                tasks: vec![],
            },
        ];

        let mut buf = Vec::new();
        Renderer::plain()
            .write_board(&mut buf, &sections, &[project], 1, 0)
            .expect("write board");
        let text = String::from_utf8(buf).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "1 todo, 0 done");
        assert_eq!(lines[2], "Today (1)");
        assert_eq!(
            strip_ansi(lines[5]).split_whitespace().collect::<Vec<_>>(),
            vec!["01234567", "06/12", "Home", "5", "Fix", "the", "gate"]
        );
        assert_eq!(lines[7], "This week (0)");
    }

    #[test]
    fn color_off_renders_plain_text() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vec![("rc.color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");
        assert!(!renderer.color);
        assert_eq!(renderer.paint("late", "31"), "late");

        cfg.apply_overrides(vec![("color".to_string(), "sometimes".to_string())]);
        assert!(Renderer::new(&cfg).is_err());
    }

    #[test]
    fn short_id_truncates_long_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
        assert_eq!(short_id("abc"), "abc");
    }
}
