//! # hla-sim
//!
//! HLA 等位基因蛋白序列相似度分析：把供体 HLA 分型按序列相似度聚类，
//! 再与抗原特异性 T 细胞反应强度做对应分析。
//!
//! 各步骤之间通过工作目录里的文件衔接（见 [`config::Layout`]）：
//!
//! - **retrieve**：由 G/P 分组命名文件和各位点蛋白序列构建等位基因序列库
//! - **typecheck**：检查供体分型表里的等位基因是否都在序列库中
//! - **align / compare**：两个等位基因的 BLOSUM100 全局比对（交互式或一次性）
//! - **simmat**：MHC I / MHC II 两两相似度矩阵（rayon 并行）
//! - **cluster**：拉普拉斯特征映射 + 高斯混合模型聚类
//! - **ca**：反应分级、列联表与对应分析
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use hla_sim::align::{global_align, AlignParams};
//!
//! let params = AlignParams::default();
//! let aln = global_align(b"MAVMAPRTLLL", b"MAVMAPRTVLL", params).unwrap();
//! println!("similarity {:.3}", aln.similarity(params.normaliser));
//! ```
//!
//! ## 模块说明
//!
//! - [`config`] — 工作目录布局与分析参数
//! - [`io`] — FASTA 与 CSV 表格
//! - [`db`] — 等位基因序列库与 G/P 分组
//! - [`typing`] — 供体分型表与一致性检查
//! - [`align`] — BLOSUM100、全局比对、比较报告与交互会话
//! - [`simmat`] — 相似度矩阵
//! - [`cluster`] — 谱嵌入与 GMM 聚类
//! - [`ca`] — 对应分析
//! - [`plot`] — SVG 图表

pub mod align;
pub mod ca;
pub mod cluster;
pub mod config;
pub mod db;
pub mod io;
pub mod plot;
pub mod simmat;
pub mod typing;
