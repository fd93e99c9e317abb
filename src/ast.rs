#[derive(Debug, PartialEq, Clone)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(char, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, PartialEq, Clone)]
pub struct Prototype {
    pub name: String,
    pub params: Vec<String>,
}

impl Prototype {
    /// Top-level expressions are wrapped in a function with an empty name;
    /// those bypass the function table entirely.
    pub fn is_anonymous(&self) -> bool {
        self.name.is_empty()
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Function {
    pub proto: Prototype,
    pub body: Expr,
}

impl Function {
    /// Wrap a bare expression as an anonymous nullary function.
    pub fn top_level(body: Expr) -> Self {
        Self {
            proto: Prototype {
                name: String::new(),
                params: Vec::new(),
            },
            body,
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub enum Item {
    Extern(Prototype),
    Function(Function),
}
