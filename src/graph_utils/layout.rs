use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};

use crate::error::AppError;

/// Positions in Graphviz inches, origin bottom-left.
#[derive(Clone, Debug, PartialEq)]
pub struct PlacedNode {
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlacedEdge {
    pub tail: String,
    pub head: String,
    /// B-spline control points as emitted by Graphviz.
    pub points: Vec<(f32, f32)>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphLayout {
    pub width: f32,
    pub height: f32,
    pub nodes: Vec<PlacedNode>,
    pub edges: Vec<PlacedEdge>,
}

/// Turns DOT text into a drawable layout.
pub trait GraphRenderer {
    fn layout(&self, dot: &str) -> std::result::Result<GraphLayout, AppError>;
}

/// Lays DOT out with the Graphviz `dot` program (`-Tplain`).
#[derive(Clone, Debug)]
pub struct GraphvizRenderer {
    program: PathBuf,
}

impl GraphvizRenderer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn run(&self, dot: &str) -> Result<String> {
        let mut child = Command::new(&self.program)
            .arg("-Tplain")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to start {}", self.program.display()))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(dot.as_bytes())?;
        }
        let output = child.wait_with_output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("{} exited with {}: {}", self.program.display(), output.status, stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for GraphvizRenderer {
    fn default() -> Self { Self::new("dot") }
}

impl GraphRenderer for GraphvizRenderer {
    fn layout(&self, dot: &str) -> std::result::Result<GraphLayout, AppError> {
        let plain = self.run(dot).map_err(|e| AppError::Rendering(format!("{:#}", e)))?;
        parse_plain(&plain).map_err(|e| AppError::Rendering(format!("{:#}", e)))
    }
}

/// Parse Graphviz `plain` output (`graph`, `node`, `edge` and `stop` statements).
pub fn parse_plain(text: &str) -> Result<GraphLayout> {
    let mut layout = GraphLayout::default();
    let mut saw_graph = false;
    for (lineno, line) in text.lines().enumerate() {
        let tokens = tokenize(line).with_context(|| format!("line {}", lineno + 1))?;
        let Some(kind) = tokens.first() else { continue };
        match kind.as_str() {
            "graph" => {
                if tokens.len() < 4 {
                    return Err(anyhow!("line {}: short graph statement", lineno + 1));
                }
                layout.width = num(&tokens[2])?;
                layout.height = num(&tokens[3])?;
                saw_graph = true;
            }
            "node" => {
                if tokens.len() < 6 {
                    return Err(anyhow!("line {}: short node statement", lineno + 1));
                }
                layout.nodes.push(PlacedNode {
                    name: tokens[1].clone(),
                    x: num(&tokens[2])?,
                    y: num(&tokens[3])?,
                    width: num(&tokens[4])?,
                    height: num(&tokens[5])?,
                });
            }
            "edge" => {
                if tokens.len() < 4 {
                    return Err(anyhow!("line {}: short edge statement", lineno + 1));
                }
                let n: usize = tokens[3].parse().with_context(|| format!("line {}: bad point count", lineno + 1))?;
                if tokens.len() < 4 + 2 * n {
                    return Err(anyhow!("line {}: edge declares {} points but has fewer", lineno + 1, n));
                }
                let mut points = Vec::with_capacity(n);
                for i in 0..n {
                    points.push((num(&tokens[4 + 2 * i])?, num(&tokens[5 + 2 * i])?));
                }
                layout.edges.push(PlacedEdge { tail: tokens[1].clone(), head: tokens[2].clone(), points });
            }
            "stop" => break,
            other => return Err(anyhow!("line {}: unexpected statement '{}'", lineno + 1, other)),
        }
    }
    if !saw_graph {
        return Err(anyhow!("no graph statement in layout output"));
    }
    Ok(layout)
}

fn num(tok: &str) -> Result<f32> {
    tok.parse::<f32>().map_err(|e| anyhow!("invalid number '{}': {}", tok, e))
}

// Whitespace separated tokens; quoted tokens may contain spaces and `\"`.
fn tokenize(line: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut chars = line.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut tok = String::new();
        if c == '"' {
            chars.next();
            let mut closed = false;
            while let Some(ch) = chars.next() {
                match ch {
                    '\\' if chars.peek() == Some(&'"') => {
                        chars.next();
                        tok.push('"');
                    }
                    '"' => {
                        closed = true;
                        break;
                    }
                    _ => tok.push(ch),
                }
            }
            if !closed {
                return Err(anyhow!("unterminated quoted string"));
            }
        } else {
            while let Some(&ch) = chars.peek() {
                if ch.is_whitespace() { break; }
                tok.push(ch);
                chars.next();
            }
        }
        out.push(tok);
    }
    Ok(out)
}

/// The name Graphviz gives a node written with `projection::to_dot`: escaped quotes
/// are read back as plain quotes.
pub fn graphviz_name(node_id: &str) -> String {
    let mut name = node_id.replace("\\\"", "\"");
    if name.ends_with('\\') {
        name.pop();
    }
    name
}
