//! Parse-result trees.
//!
//! The engine builds one [`ParseTree`] per accepted input. Grammars routinely
//! accept pathologically nested inputs (thousands of levels of parentheses),
//! so equality, destruction and formatting are all implemented with explicit
//! worklists instead of recursion.

use std::{fmt, mem};

/// Identifies which construct produced an interior node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tag {
    /// An untagged production: the nonterminal name plus the index of the
    /// alternative in the surface grammar. The index is `None` when the
    /// nonterminal has a single alternative.
    Production { name: String, index: Option<u32> },

    /// A named reduction action.
    Method(String),
}

impl Tag {
    pub fn production(name: impl Into<String>, index: Option<u32>) -> Self {
        Self::Production {
            name: name.into(),
            index,
        }
    }

    pub fn method(name: impl Into<String>) -> Self {
        Self::Method(name.into())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Production { name, index: None } => f.write_str(name),
            Self::Production {
                name,
                index: Some(i),
            } => write!(f, "{} {}", name, i),
            Self::Method(name) => f.write_str(name),
        }
    }
}

/// An ordered tree built by the engine's reduction actions.
///
/// Leaves are the raw tokens handed over by the tokenizer; interior nodes are
/// tagged by the production or reduction action that built them. An optional
/// symbol that was omitted appears as an explicit [`ParseTree::Absent`]
/// marker in its slot, never silently dropped.
#[derive(Debug)]
pub enum ParseTree<T> {
    Leaf(T),
    Absent,
    Node(Node<T>),
}

#[derive(Debug)]
pub struct Node<T> {
    pub tag: Tag,
    pub children: Vec<ParseTree<T>>,
}

impl<T> ParseTree<T> {
    pub fn node(tag: Tag, children: Vec<ParseTree<T>>) -> Self {
        Self::Node(Node { tag, children })
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// The leaf tokens of this tree, left to right.
    pub fn leaves(&self) -> impl Iterator<Item = &T> + '_ {
        let mut stack = vec![self];
        std::iter::from_fn(move || {
            while let Some(tree) = stack.pop() {
                match tree {
                    Self::Leaf(token) => return Some(token),
                    Self::Absent => {}
                    Self::Node(node) => stack.extend(node.children.iter().rev()),
                }
            }
            None
        })
    }
}

impl<T: PartialEq> PartialEq for ParseTree<T> {
    fn eq(&self, other: &Self) -> bool {
        let mut pending = vec![(self, other)];
        while let Some((a, b)) = pending.pop() {
            match (a, b) {
                (Self::Leaf(a), Self::Leaf(b)) => {
                    if a != b {
                        return false;
                    }
                }
                (Self::Absent, Self::Absent) => {}
                (Self::Node(a), Self::Node(b)) => {
                    if a.tag != b.tag || a.children.len() != b.children.len() {
                        return false;
                    }
                    pending.extend(a.children.iter().zip(&b.children));
                }
                _ => return false,
            }
        }
        true
    }
}

impl<T: Eq> Eq for ParseTree<T> {}

impl<T> Drop for ParseTree<T> {
    fn drop(&mut self) {
        let mut stack = match self {
            Self::Node(node) => mem::take(&mut node.children),
            _ => return,
        };
        while let Some(mut tree) = stack.pop() {
            if let Self::Node(node) = &mut tree {
                stack.append(&mut node.children);
            }
        }
    }
}

// `(tag child child ...)`, in the style of the grammar display forms.
impl<T: fmt::Display> fmt::Display for ParseTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        enum Step<'a, T> {
            Tree(&'a ParseTree<T>),
            Text(&'static str),
        }
        let mut stack = vec![Step::Tree(self)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Text(text) => f.write_str(text)?,
                Step::Tree(ParseTree::Leaf(token)) => write!(f, "{}", token)?,
                Step::Tree(ParseTree::Absent) => f.write_str("~")?,
                Step::Tree(ParseTree::Node(node)) => {
                    write!(f, "({}", node.tag)?;
                    stack.push(Step::Text(")"));
                    for child in node.children.iter().rev() {
                        stack.push(Step::Tree(child));
                        stack.push(Step::Text(" "));
                    }
                }
            }
        }
        Ok(())
    }
}

/// A constant tree shape, used for the values of nonterminals that derive
/// the empty string. Templates contain no leaves, so they can be stamped out
/// for any token type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ValueTemplate {
    Absent,
    Node { tag: Tag, children: Vec<ValueTemplate> },
}

impl ValueTemplate {
    pub fn instantiate<T>(&self) -> ParseTree<T> {
        match self {
            Self::Absent => ParseTree::Absent,
            Self::Node { tag, children } => ParseTree::node(
                tag.clone(),
                children.iter().map(ValueTemplate::instantiate).collect(),
            ),
        }
    }
}
