//! インデックス構築と森構造の検証
//!
//! マージの完了後、すべてのノードの`name_index`を最終的な`name`から再計算し、
//! 森の不変条件を検証します。違反が一つでもあれば辞書は出力されません。
//!
//! 一つしか子を持たないノードの連なりを畳み込むことはしません。

use crate::errors::{InvariantError, Result, Violation};
use crate::level::AddressLevel;
use crate::node::{NULL_ID, NodeId};
use crate::normalize::normalize;
use crate::registry::Registry;
use crate::utils::FromU32;

/// 確定処理の結果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FinalizeReport {
    /// ノード数
    pub nodes: usize,
    /// 根の数
    pub roots: usize,
    /// レベルごとのノード数(添字0がレベル1)
    pub levels: [usize; AddressLevel::MAX as usize],
}

/// 森構造を確定させる
pub struct IndexBuilder;

impl IndexBuilder {
    /// `name_index`を計算し、森の不変条件を検証します。
    ///
    /// # エラー
    ///
    /// 不変条件の違反が見つかった場合、すべての違反を含む
    /// [`AddrDictError::Invariant`](crate::errors::AddrDictError::Invariant)を返します。
    pub fn finalize(registry: &mut Registry) -> Result<FinalizeReport> {
        for node in registry.nodes_mut() {
            node.refresh_name_index();
        }

        let violations = Self::validate(registry);
        if !violations.is_empty() {
            for v in &violations {
                log::error!("{}", v);
            }
            return Err(InvariantError { violations }.into());
        }

        let mut report = FinalizeReport {
            nodes: registry.len(),
            ..Default::default()
        };
        for node in registry.nodes() {
            if node.is_root() {
                report.roots += 1;
            }
            if let Some(count) = usize::try_from(node.level - 1)
                .ok()
                .and_then(|i| report.levels.get_mut(i))
            {
                *count += 1;
            }
        }
        log::info!(
            "Finalized {} nodes ({} roots)",
            report.nodes,
            report.roots
        );
        Ok(report)
    }

    /// 森の不変条件を検証し、見つかったすべての違反を返します。
    pub fn validate(registry: &Registry) -> Vec<Violation> {
        let nodes = registry.nodes();
        let mut violations = vec![];

        for (i, node) in nodes.iter().enumerate() {
            let position = NodeId::try_from(i + 1).unwrap_or(NodeId::MAX);
            if node.id != position {
                violations.push(Violation::IdMismatch {
                    position,
                    node: node.id,
                });
            }

            if node.sibling_id != NULL_ID && registry.get(node.sibling_id).is_none() {
                violations.push(Violation::DanglingSibling {
                    node: node.id,
                    sibling: node.sibling_id,
                });
            }

            if AddressLevel::from_i8(node.level).is_none() {
                violations.push(Violation::LevelOutOfRange {
                    node: node.id,
                    level: node.level,
                });
                continue;
            }
            if node.parent_id == NULL_ID {
                if node.level != AddressLevel::MIN {
                    violations.push(Violation::MisplacedRoot {
                        node: node.id,
                        level: node.level,
                    });
                }
                continue;
            }
            let Some(parent) = registry.get(node.parent_id) else {
                violations.push(Violation::DanglingParent {
                    node: node.id,
                    parent: node.parent_id,
                });
                continue;
            };
            if parent.level != node.level - 1 {
                violations.push(Violation::LevelMismatch {
                    node: node.id,
                    level: node.level,
                    parent_level: parent.level,
                });
            }
            if !reaches_root(registry, node.parent_id) {
                violations.push(Violation::Cycle { node: node.id });
            }
        }

        let mut visited = vec![false; nodes.len()];
        for parent_id in registry.parents() {
            let mut next = registry.first_child(parent_id);
            while next != NULL_ID {
                let Some(child) = registry.get(next) else {
                    // 先頭以外はノードごとの検査で報告済み
                    if next == registry.first_child(parent_id) {
                        violations.push(Violation::DanglingSibling {
                            node: parent_id,
                            sibling: next,
                        });
                    }
                    break;
                };
                let idx = usize::from_u32(next - 1);
                if child.parent_id != parent_id {
                    violations.push(Violation::ForeignSibling {
                        parent: parent_id,
                        node: child.id,
                    });
                    break;
                }
                if visited[idx] {
                    violations.push(Violation::SiblingLoop {
                        parent: parent_id,
                        node: child.id,
                    });
                    break;
                }
                visited[idx] = true;
                next = child.sibling_id;
            }
        }

        for (node, seen) in nodes.iter().zip(&visited) {
            if !seen {
                violations.push(Violation::OrphanedChild {
                    parent: node.parent_id,
                    node: node.id,
                });
            }
        }

        violations
    }
}

/// 親をたどって根に到達するかどうか
///
/// レベルの深さを超えてたどった場合は循環とみなします。
fn reaches_root(registry: &Registry, mut id: NodeId) -> bool {
    for _ in 0..AddressLevel::MAX {
        match registry.get(id) {
            Some(node) if node.parent_id == NULL_ID => return true,
            Some(node) => id = node.parent_id,
            None => return false,
        }
    }
    false
}

/// `name_index`が`name`から再計算した値と一致するかどうか
pub fn name_index_is_consistent(name: &str, name_index: &str) -> bool {
    normalize(name) == name_index
}
