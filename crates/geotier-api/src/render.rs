//! Fixed-width text tables for listing commands.
//!
//! ```text
//! +---------------------------------------+---------------------------------------+
//! |                                  Pool |                                  Rule |
//! +---------------------------------------+---------------------------------------+
//! |                                   rbd |                              ssd-east |
//! +---------------------------------------+---------------------------------------+
//! ```

pub const TABLE_WIDTH: usize = 80;

#[derive(Debug, Clone)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: &[&str]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Missing trailing cells render blank.
    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    /// Append a row whose `wrap_col` cell is word-wrapped to the column
    /// width; continuation lines leave the other cells blank.
    pub fn row_wrapped(&mut self, cells: Vec<String>, wrap_col: usize) {
        let Some(text) = cells.get(wrap_col) else {
            self.row(cells);
            return;
        };
        let lines = wrap(text, self.cell_width());
        let mut first = cells.clone();
        first[wrap_col] = lines[0].clone();
        self.row(first);
        for line in &lines[1..] {
            let mut cont = vec![String::new(); cells.len()];
            cont[wrap_col] = line.clone();
            self.row(cont);
        }
    }

    fn cell_width(&self) -> usize {
        TABLE_WIDTH / self.headers.len().max(1) - 2
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn render(&self) -> String {
        let columns = self.headers.len().max(1);
        let width = TABLE_WIDTH / columns;
        let dashes = dash_line(columns, width);

        let mut out = String::new();
        out.push_str(&dashes);
        out.push_str(&render_row(&self.headers, columns, width));
        out.push_str(&dashes);
        for row in &self.rows {
            out.push_str(&render_row(row, columns, width));
        }
        out.push_str(&dashes);
        out
    }
}

fn dash_line(columns: usize, width: usize) -> String {
    let mut line = String::from("+");
    for _ in 0..columns {
        line.push_str(&"-".repeat(width - 1));
        line.push('+');
    }
    line.push('\n');
    line
}

fn render_row(cells: &[String], columns: usize, width: usize) -> String {
    let mut line = String::from("|");
    for i in 0..columns {
        let cell = cells.get(i).map(String::as_str).unwrap_or("");
        line.push_str(&format!("{:>w$} |", cell, w = width - 2));
    }
    line.push('\n');
    line
}

/// Greedy word wrap. Words longer than `width` are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word = word;
        while word.chars().count() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            let split = word
                .char_indices()
                .nth(width)
                .map(|(i, _)| i)
                .unwrap_or(word.len());
            lines.push(word[..split].to_string());
            word = &word[split..];
        }
        if word.is_empty() {
            continue;
        }
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
