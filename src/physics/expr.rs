//! Symbolic expressions over positions, velocities, parameters and time
//!
//! Expressions live in an [`ExprArena`] and are addressed by [`ExprId`].
//! Nodes are immutable once pushed and always reference children that were
//! pushed before them, so arena order is a valid evaluation order. This lets
//! a compiled constraint evaluate every tree it owns (value, time derivative,
//! Jacobian entries) in a single forward sweep.
//!
//! Identity simplifications are applied by the constructors rather than in a
//! separate pass:
//! - `x + 0`, `0 + x`, `x - 0` → `x`; `0 - x` → `-x`
//! - `x * 1`, `1 * x`, `x / 1` → `x`; `x * 0`, `0 * x`, `0 / x` → `0`
//! - `-0` → `0`; `-(-x)` → `x`
//! - operators over two constants fold into one constant
//!
//! Without these, repeated differentiation grows trees quickly (every
//! product rule application doubles a term that is mostly zeros).

use crate::physics::math::Scalar;
use std::collections::HashMap;
use std::fmt;

/// Index of a node inside an [`ExprArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Three expressions treated as the components of a symbolic 3-vector
pub type Expr3 = [ExprId; 3];

/// The free variables an expression can be differentiated by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Time,
    Position(u32),
    Velocity(u32),
    Parameter(u32),
}

/// Test applied to the value of a conditional's `test` expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Predicate {
    LessThan(Scalar),
    GreaterThan(Scalar),
}

impl Predicate {
    #[inline]
    pub fn holds(&self, value: Scalar) -> bool {
        match *self {
            Predicate::LessThan(threshold) => value < threshold,
            Predicate::GreaterThan(threshold) => value > threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node {
    Zero,
    One,
    Const(Scalar),
    Time,
    Position(u32),
    Velocity(u32),
    Parameter(u32),
    Add(ExprId, ExprId),
    Sub(ExprId, ExprId),
    Neg(ExprId),
    Mul(ExprId, ExprId),
    Div(ExprId, ExprId),
    Sin(ExprId),
    Cos(ExprId),
    /// `then` when `predicate(test)` holds, `otherwise` when it does not
    Conditional {
        predicate: Predicate,
        test: ExprId,
        then: ExprId,
        otherwise: ExprId,
    },
}

impl Node {
    fn map_children(self, mut f: impl FnMut(ExprId) -> ExprId) -> Node {
        match self {
            Node::Add(a, b) => Node::Add(f(a), f(b)),
            Node::Sub(a, b) => Node::Sub(f(a), f(b)),
            Node::Mul(a, b) => Node::Mul(f(a), f(b)),
            Node::Div(a, b) => Node::Div(f(a), f(b)),
            Node::Neg(a) => Node::Neg(f(a)),
            Node::Sin(a) => Node::Sin(f(a)),
            Node::Cos(a) => Node::Cos(f(a)),
            Node::Conditional {
                predicate,
                test,
                then,
                otherwise,
            } => Node::Conditional {
                predicate,
                test: f(test),
                then: f(then),
                otherwise: f(otherwise),
            },
            leaf => leaf,
        }
    }
}

/// Concrete values bound to the variables of an expression
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub positions: &'a [Scalar],
    pub velocities: &'a [Scalar],
    pub parameters: &'a [Scalar],
    pub time: Scalar,
}

impl<'a> Scope<'a> {
    pub fn new(
        positions: &'a [Scalar],
        velocities: &'a [Scalar],
        parameters: &'a [Scalar],
        time: Scalar,
    ) -> Self {
        Self {
            positions,
            velocities,
            parameters,
            time,
        }
    }
}

/// Append-only storage for expression nodes
#[derive(Debug, Clone)]
pub struct ExprArena {
    nodes: Vec<Node>,
}

impl Default for ExprArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ExprArena {
    pub const ZERO: ExprId = ExprId(0);
    pub const ONE: ExprId = ExprId(1);

    pub fn new() -> Self {
        Self {
            nodes: vec![Node::Zero, Node::One],
        }
    }

    #[inline]
    pub fn node(&self, id: ExprId) -> Node {
        self.nodes[id.index()]
    }

    /// Node count, including the seeded `ZERO` and `ONE`
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    fn push(&mut self, node: Node) -> ExprId {
        let id = ExprId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    fn constant_value(&self, id: ExprId) -> Option<Scalar> {
        match self.node(id) {
            Node::Zero => Some(0.0),
            Node::One => Some(1.0),
            Node::Const(c) => Some(c),
            _ => None,
        }
    }

    fn fold2(
        &mut self,
        a: ExprId,
        b: ExprId,
        op: fn(Scalar, Scalar) -> Scalar,
    ) -> Option<ExprId> {
        let (a, b) = (self.constant_value(a)?, self.constant_value(b)?);
        Some(self.constant(op(a, b)))
    }

    pub fn constant(&mut self, c: Scalar) -> ExprId {
        if c == 0.0 {
            Self::ZERO
        } else if c == 1.0 {
            Self::ONE
        } else {
            self.push(Node::Const(c))
        }
    }

    pub fn variable(&mut self, variable: Variable) -> ExprId {
        self.push(match variable {
            Variable::Time => Node::Time,
            Variable::Position(i) => Node::Position(i),
            Variable::Velocity(i) => Node::Velocity(i),
            Variable::Parameter(i) => Node::Parameter(i),
        })
    }

    pub fn time(&mut self) -> ExprId {
        self.variable(Variable::Time)
    }

    pub fn position(&mut self, i: u32) -> ExprId {
        self.variable(Variable::Position(i))
    }

    pub fn velocity(&mut self, i: u32) -> ExprId {
        self.variable(Variable::Velocity(i))
    }

    pub fn parameter(&mut self, i: u32) -> ExprId {
        self.variable(Variable::Parameter(i))
    }

    pub fn add(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if a == Self::ZERO {
            return b;
        }
        if b == Self::ZERO {
            return a;
        }
        self.fold2(a, b, |a, b| a + b)
            .unwrap_or_else(|| self.push(Node::Add(a, b)))
    }

    pub fn sub(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if b == Self::ZERO {
            return a;
        }
        if a == Self::ZERO {
            return self.neg(b);
        }
        self.fold2(a, b, |a, b| a - b)
            .unwrap_or_else(|| self.push(Node::Sub(a, b)))
    }

    pub fn neg(&mut self, a: ExprId) -> ExprId {
        match self.node(a) {
            Node::Zero => Self::ZERO,
            Node::Neg(inner) => inner,
            Node::One => self.constant(-1.0),
            Node::Const(c) => self.constant(-c),
            _ => self.push(Node::Neg(a)),
        }
    }

    pub fn mul(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if a == Self::ZERO || b == Self::ZERO {
            return Self::ZERO;
        }
        if a == Self::ONE {
            return b;
        }
        if b == Self::ONE {
            return a;
        }
        self.fold2(a, b, |a, b| a * b)
            .unwrap_or_else(|| self.push(Node::Mul(a, b)))
    }

    pub fn div(&mut self, a: ExprId, b: ExprId) -> ExprId {
        if a == Self::ZERO {
            return Self::ZERO;
        }
        if b == Self::ONE {
            return a;
        }
        self.fold2(a, b, |a, b| a / b)
            .unwrap_or_else(|| self.push(Node::Div(a, b)))
    }

    pub fn sin(&mut self, a: ExprId) -> ExprId {
        match self.constant_value(a) {
            Some(c) => self.constant(libm::sin(c)),
            None => self.push(Node::Sin(a)),
        }
    }

    pub fn cos(&mut self, a: ExprId) -> ExprId {
        match self.constant_value(a) {
            Some(c) => self.constant(libm::cos(c)),
            None => self.push(Node::Cos(a)),
        }
    }

    pub fn conditional(
        &mut self,
        predicate: Predicate,
        test: ExprId,
        then: ExprId,
        otherwise: ExprId,
    ) -> ExprId {
        if then == otherwise {
            return then;
        }
        if let Some(value) = self.constant_value(test) {
            return if predicate.holds(value) { then } else { otherwise };
        }
        self.push(Node::Conditional {
            predicate,
            test,
            then,
            otherwise,
        })
    }

    pub fn position3(&mut self, first: u32) -> Expr3 {
        [
            self.position(first),
            self.position(first + 1),
            self.position(first + 2),
        ]
    }

    pub fn velocity3(&mut self, first: u32) -> Expr3 {
        [
            self.velocity(first),
            self.velocity(first + 1),
            self.velocity(first + 2),
        ]
    }

    pub fn parameter3(&mut self, first: u32) -> Expr3 {
        [
            self.parameter(first),
            self.parameter(first + 1),
            self.parameter(first + 2),
        ]
    }

    pub fn sub3(&mut self, a: Expr3, b: Expr3) -> Expr3 {
        [
            self.sub(a[0], b[0]),
            self.sub(a[1], b[1]),
            self.sub(a[2], b[2]),
        ]
    }

    pub fn dot3(&mut self, a: Expr3, b: Expr3) -> ExprId {
        let xx = self.mul(a[0], b[0]);
        let yy = self.mul(a[1], b[1]);
        let zz = self.mul(a[2], b[2]);
        let xy = self.add(xx, yy);
        self.add(xy, zz)
    }

    pub fn length_squared3(&mut self, a: Expr3) -> ExprId {
        self.dot3(a, a)
    }

    /// Evaluate a single tree; conditionals only evaluate the selected branch
    pub fn evaluate(&self, id: ExprId, scope: &Scope) -> Scalar {
        match self.node(id) {
            Node::Zero => 0.0,
            Node::One => 1.0,
            Node::Const(c) => c,
            Node::Time => scope.time,
            Node::Position(i) => scope.positions[i as usize],
            Node::Velocity(i) => scope.velocities[i as usize],
            Node::Parameter(i) => scope.parameters[i as usize],
            Node::Add(a, b) => self.evaluate(a, scope) + self.evaluate(b, scope),
            Node::Sub(a, b) => self.evaluate(a, scope) - self.evaluate(b, scope),
            Node::Neg(a) => -self.evaluate(a, scope),
            Node::Mul(a, b) => self.evaluate(a, scope) * self.evaluate(b, scope),
            Node::Div(a, b) => self.evaluate(a, scope) / self.evaluate(b, scope),
            Node::Sin(a) => libm::sin(self.evaluate(a, scope)),
            Node::Cos(a) => libm::cos(self.evaluate(a, scope)),
            Node::Conditional {
                predicate,
                test,
                then,
                otherwise,
            } => {
                if predicate.holds(self.evaluate(test, scope)) {
                    self.evaluate(then, scope)
                } else {
                    self.evaluate(otherwise, scope)
                }
            }
        }
    }

    /// Evaluate every node of the arena in order, writing `values[id]`
    ///
    /// Both branches of a conditional are computed; only the selected value
    /// propagates.
    pub fn evaluate_all(&self, scope: &Scope, values: &mut Vec<Scalar>) {
        values.clear();
        values.reserve(self.nodes.len());

        for node in &self.nodes {
            let value = match *node {
                Node::Zero => 0.0,
                Node::One => 1.0,
                Node::Const(c) => c,
                Node::Time => scope.time,
                Node::Position(i) => scope.positions[i as usize],
                Node::Velocity(i) => scope.velocities[i as usize],
                Node::Parameter(i) => scope.parameters[i as usize],
                Node::Add(a, b) => values[a.index()] + values[b.index()],
                Node::Sub(a, b) => values[a.index()] - values[b.index()],
                Node::Neg(a) => -values[a.index()],
                Node::Mul(a, b) => values[a.index()] * values[b.index()],
                Node::Div(a, b) => values[a.index()] / values[b.index()],
                Node::Sin(a) => libm::sin(values[a.index()]),
                Node::Cos(a) => libm::cos(values[a.index()]),
                Node::Conditional {
                    predicate,
                    test,
                    then,
                    otherwise,
                } => {
                    if predicate.holds(values[test.index()]) {
                        values[then.index()]
                    } else {
                        values[otherwise.index()]
                    }
                }
            };
            values.push(value);
        }
    }

    /// Symbolic derivative of `id` with respect to `variable`
    ///
    /// Positions differentiate by time into the matching velocity, so the
    /// time derivative of a position-level formula is its total derivative
    /// along the motion. Shared subtrees are differentiated once.
    pub fn differentiate(&mut self, id: ExprId, variable: Variable) -> ExprId {
        let mut memo = HashMap::new();
        self.differentiate_memo(id, variable, &mut memo)
    }

    fn differentiate_memo(
        &mut self,
        id: ExprId,
        variable: Variable,
        memo: &mut HashMap<ExprId, ExprId>,
    ) -> ExprId {
        if let Some(&derivative) = memo.get(&id) {
            return derivative;
        }

        let derivative = match self.node(id) {
            Node::Zero | Node::One | Node::Const(_) => Self::ZERO,
            Node::Time => match variable {
                Variable::Time => Self::ONE,
                _ => Self::ZERO,
            },
            Node::Position(i) => match variable {
                Variable::Time => self.velocity(i),
                Variable::Position(j) if i == j => Self::ONE,
                _ => Self::ZERO,
            },
            Node::Velocity(i) => match variable {
                Variable::Velocity(j) if i == j => Self::ONE,
                _ => Self::ZERO,
            },
            Node::Parameter(i) => match variable {
                Variable::Parameter(j) if i == j => Self::ONE,
                _ => Self::ZERO,
            },
            Node::Add(a, b) => {
                let da = self.differentiate_memo(a, variable, memo);
                let db = self.differentiate_memo(b, variable, memo);
                self.add(da, db)
            }
            Node::Sub(a, b) => {
                let da = self.differentiate_memo(a, variable, memo);
                let db = self.differentiate_memo(b, variable, memo);
                self.sub(da, db)
            }
            Node::Neg(a) => {
                let da = self.differentiate_memo(a, variable, memo);
                self.neg(da)
            }
            Node::Mul(a, b) => {
                let da = self.differentiate_memo(a, variable, memo);
                let db = self.differentiate_memo(b, variable, memo);
                let left = self.mul(da, b);
                let right = self.mul(a, db);
                self.add(left, right)
            }
            Node::Div(a, b) => {
                // (a'b - ab') / b²
                let da = self.differentiate_memo(a, variable, memo);
                let db = self.differentiate_memo(b, variable, memo);
                let left = self.mul(da, b);
                let right = self.mul(a, db);
                let numerator = self.sub(left, right);
                let denominator = self.mul(b, b);
                self.div(numerator, denominator)
            }
            Node::Sin(a) => {
                let da = self.differentiate_memo(a, variable, memo);
                let cos = self.cos(a);
                self.mul(cos, da)
            }
            Node::Cos(a) => {
                let da = self.differentiate_memo(a, variable, memo);
                let sin = self.sin(a);
                let product = self.mul(sin, da);
                self.neg(product)
            }
            Node::Conditional {
                predicate,
                test,
                then,
                otherwise,
            } => {
                let d_then = self.differentiate_memo(then, variable, memo);
                let d_otherwise = self.differentiate_memo(otherwise, variable, memo);
                self.conditional(predicate, test, d_then, d_otherwise)
            }
        };

        memo.insert(id, derivative);
        derivative
    }

    /// Mark every node reachable from `roots`
    fn reachable(&self, roots: &[ExprId]) -> Vec<bool> {
        let mut marked = vec![false; self.nodes.len()];
        for root in roots {
            marked[root.index()] = true;
        }

        // Children always precede parents, so one backwards pass suffices
        for index in (0..self.nodes.len()).rev() {
            if !marked[index] {
                continue;
            }
            match self.nodes[index] {
                Node::Add(a, b) | Node::Sub(a, b) | Node::Mul(a, b) | Node::Div(a, b) => {
                    marked[a.index()] = true;
                    marked[b.index()] = true;
                }
                Node::Neg(a) | Node::Sin(a) | Node::Cos(a) => marked[a.index()] = true,
                Node::Conditional {
                    test,
                    then,
                    otherwise,
                    ..
                } => {
                    marked[test.index()] = true;
                    marked[then.index()] = true;
                    marked[otherwise.index()] = true;
                }
                _ => {}
            }
        }

        marked
    }

    /// Copy the nodes reachable from `roots` into a fresh arena
    ///
    /// Returns the new arena and the remapped roots, in the same order.
    /// Intermediate nodes left behind by differentiation are dropped so a
    /// later [`ExprArena::evaluate_all`] only touches live nodes.
    pub fn compact(&self, roots: &[ExprId]) -> (ExprArena, Vec<ExprId>) {
        let marked = self.reachable(roots);
        let mut remap = vec![Self::ZERO; self.nodes.len()];
        let mut compacted = ExprArena::new();

        for (index, node) in self.nodes.iter().enumerate() {
            if !marked[index] {
                continue;
            }
            let id = match *node {
                Node::Zero => Self::ZERO,
                Node::One => Self::ONE,
                other => compacted.push(other.map_children(|child| remap[child.index()])),
            };
            remap[index] = id;
        }

        let roots = roots.iter().map(|root| remap[root.index()]).collect();
        (compacted, roots)
    }

    /// Highest position/velocity index referenced from `roots`, plus one
    pub fn component_count(&self, roots: &[ExprId]) -> usize {
        self.reachable(roots)
            .iter()
            .zip(&self.nodes)
            .filter(|(marked, _)| **marked)
            .filter_map(|(_, node)| match *node {
                Node::Position(i) | Node::Velocity(i) => Some(i as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Highest parameter index referenced from `roots`, plus one
    pub fn parameter_count(&self, roots: &[ExprId]) -> usize {
        self.reachable(roots)
            .iter()
            .zip(&self.nodes)
            .filter(|(marked, _)| **marked)
            .filter_map(|(_, node)| match *node {
                Node::Parameter(i) => Some(i as usize + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }

    /// Render an expression in infix form, mostly for debug logging
    pub fn display(&self, id: ExprId) -> ExprDisplay<'_> {
        ExprDisplay { arena: self, id }
    }
}

pub struct ExprDisplay<'a> {
    arena: &'a ExprArena,
    id: ExprId,
}

impl fmt::Display for ExprDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sub = |id| ExprDisplay {
            arena: self.arena,
            id,
        };
        match self.arena.node(self.id) {
            Node::Zero => write!(f, "0"),
            Node::One => write!(f, "1"),
            Node::Const(c) => write!(f, "{c}"),
            Node::Time => write!(f, "t"),
            Node::Position(i) => write!(f, "x{i}"),
            Node::Velocity(i) => write!(f, "v{i}"),
            Node::Parameter(i) => write!(f, "p{i}"),
            Node::Add(a, b) => write!(f, "({} + {})", sub(a), sub(b)),
            Node::Sub(a, b) => write!(f, "({} - {})", sub(a), sub(b)),
            Node::Neg(a) => write!(f, "-{}", sub(a)),
            Node::Mul(a, b) => write!(f, "{} * {}", sub(a), sub(b)),
            Node::Div(a, b) => write!(f, "{} / {}", sub(a), sub(b)),
            Node::Sin(a) => write!(f, "sin({})", sub(a)),
            Node::Cos(a) => write!(f, "cos({})", sub(a)),
            Node::Conditional {
                predicate,
                test,
                then,
                otherwise,
            } => {
                let (op, threshold) = match predicate {
                    Predicate::LessThan(threshold) => ("<", threshold),
                    Predicate::GreaterThan(threshold) => (">", threshold),
                };
                write!(
                    f,
                    "if {} {op} {threshold} {{ {} }} else {{ {} }}",
                    sub(test),
                    sub(then),
                    sub(otherwise)
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POSITIONS: [Scalar; 2] = [2.0, 3.0];
    const VELOCITIES: [Scalar; 2] = [4.0, 5.0];

    fn scope() -> Scope<'static> {
        Scope::new(&POSITIONS, &VELOCITIES, &[], 6.0)
    }

    fn assert_close(actual: Scalar, expected: Scalar) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn test_position_time_derivative_is_velocity() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let dx0 = arena.differentiate(x0, Variable::Time);
        assert_eq!(arena.node(dx0), Node::Velocity(0));
        assert_close(arena.evaluate(dx0, &scope()), 4.0);
    }

    #[test]
    fn test_product_rule() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let square = arena.mul(x0, x0);
        let derivative = arena.differentiate(square, Variable::Position(0));
        assert_close(arena.evaluate(derivative, &scope()), 2.0 * 2.0);
    }

    #[test]
    fn test_quotient_rule() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let x1 = arena.position(1);
        let quotient = arena.div(x0, x1);

        let by_x0 = arena.differentiate(quotient, Variable::Position(0));
        let by_x1 = arena.differentiate(quotient, Variable::Position(1));

        assert_close(arena.evaluate(by_x0, &scope()), 1.0 / 3.0);
        assert_close(arena.evaluate(by_x1, &scope()), -2.0 / 9.0);
    }

    #[test]
    fn test_trigonometric_chain_rule() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let x1 = arena.position(1);
        let argument = arena.mul(x0, x1);
        let sin = arena.sin(argument);
        let cos = arena.cos(argument);

        let d_sin = arena.differentiate(sin, Variable::Position(0));
        let d_cos = arena.differentiate(cos, Variable::Position(0));

        assert_close(arena.evaluate(d_sin, &scope()), libm::cos(6.0) * 3.0);
        assert_close(arena.evaluate(d_cos, &scope()), -libm::sin(6.0) * 3.0);
    }

    #[test]
    fn test_identity_simplifications() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let zero = ExprArena::ZERO;
        let one = ExprArena::ONE;

        assert_eq!(arena.add(x0, zero), x0);
        assert_eq!(arena.add(zero, x0), x0);
        assert_eq!(arena.sub(x0, zero), x0);
        assert_eq!(arena.mul(x0, one), x0);
        assert_eq!(arena.mul(one, x0), x0);
        assert_eq!(arena.mul(x0, zero), ExprArena::ZERO);
        assert_eq!(arena.div(zero, x0), ExprArena::ZERO);
        assert_eq!(arena.div(x0, one), x0);

        let negated = arena.neg(x0);
        assert_eq!(arena.neg(negated), x0);
        assert_eq!(arena.neg(zero), ExprArena::ZERO);

        let flipped = arena.sub(zero, x0);
        assert_eq!(arena.node(flipped), Node::Neg(x0));
    }

    #[test]
    fn test_constant_folding() {
        let mut arena = ExprArena::new();
        let two = arena.constant(2.0);
        let three = arena.constant(3.0);
        let product = arena.mul(two, three);
        assert_eq!(arena.node(product), Node::Const(6.0));

        let difference = arena.sub(three, three);
        assert_eq!(difference, ExprArena::ZERO);
    }

    #[test]
    fn test_repeated_differentiation_stays_small() {
        let mut arena = ExprArena::new();
        let x = arena.position3(0);
        let length_squared = arena.length_squared3(x);
        let before = arena.len();

        let first = arena.differentiate(length_squared, Variable::Position(0));
        let second = arena.differentiate(first, Variable::Position(0));
        let third = arena.differentiate(second, Variable::Position(0));

        let scope = Scope::new(&[1.0, 2.0, 3.0], &[0.0; 3], &[], 0.0);
        assert_close(arena.evaluate(second, &scope), 2.0);
        assert_eq!(third, ExprArena::ZERO);
        assert!(arena.len() - before < 16, "arena grew to {}", arena.len());
    }

    #[test]
    fn test_conditional_keeps_predicate_when_differentiated() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let square = arena.mul(x0, x0);
        let gated = arena.conditional(
            Predicate::LessThan(5.0),
            x0,
            square,
            ExprArena::ZERO,
        );
        let derivative = arena.differentiate(gated, Variable::Position(0));

        match arena.node(derivative) {
            Node::Conditional {
                predicate, test, ..
            } => {
                assert_eq!(predicate, Predicate::LessThan(5.0));
                assert_eq!(test, x0);
            }
            other => panic!("expected conditional, got {other:?}"),
        }

        let active = Scope::new(&[2.0], &[0.0], &[], 0.0);
        let inactive = Scope::new(&[7.0], &[0.0], &[], 0.0);
        assert_close(arena.evaluate(derivative, &active), 4.0);
        assert_close(arena.evaluate(derivative, &inactive), 0.0);
    }

    #[test]
    fn test_evaluate_all_matches_evaluate() {
        let mut arena = ExprArena::new();
        let x = arena.position3(0);
        let p = arena.parameter3(0);
        let delta = arena.sub3(x, p);
        let length_squared = arena.length_squared3(delta);
        let t = arena.time();
        let wave = arena.sin(t);
        let root = arena.div(length_squared, wave);
        let derivative = arena.differentiate(root, Variable::Time);

        let positions = [1.0, 2.0, 3.0];
        let velocities = [0.5, -1.0, 2.0];
        let parameters = [0.0, 1.0, -1.0];
        let scope = Scope::new(&positions, &velocities, &parameters, 0.7);

        let mut values = Vec::new();
        arena.evaluate_all(&scope, &mut values);

        assert_eq!(values.len(), arena.len());
        for id in [root, derivative, length_squared] {
            assert_close(values[id.index()], arena.evaluate(id, &scope));
        }
    }

    #[test]
    fn test_component_and_parameter_counts() {
        let mut arena = ExprArena::new();
        let unused = arena.position(7);
        let x2 = arena.position(2);
        let p1 = arena.parameter(1);
        let root = arena.mul(x2, p1);

        assert_eq!(arena.component_count(&[root]), 3);
        assert_eq!(arena.parameter_count(&[root]), 2);
        assert_eq!(arena.component_count(&[unused]), 8);
    }

    #[test]
    fn test_compact_drops_dead_nodes() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let _dead = arena.position(9);
        let x1 = arena.position(1);
        let product = arena.mul(x0, x1);
        let derivative = arena.differentiate(product, Variable::Position(0));

        let (compacted, roots) = arena.compact(&[product, derivative]);

        assert!(compacted.len() < arena.len());
        assert_eq!(compacted.component_count(&roots), 2);

        let scope = Scope::new(&[2.0, 3.0], &[0.0, 0.0], &[], 0.0);
        let mut values = Vec::new();
        compacted.evaluate_all(&scope, &mut values);
        assert_close(values[roots[0].index()], 6.0);
        assert_close(values[roots[1].index()], 3.0);
    }

    #[test]
    fn test_display() {
        let mut arena = ExprArena::new();
        let x0 = arena.position(0);
        let p0 = arena.parameter(0);
        let root = arena.sub(x0, p0);
        assert_eq!(arena.display(root).to_string(), "(x0 - p0)");
    }
}
