//! Table models. The schema itself is created by `SCHEMA` in the parent
//! module so the unique indexes live next to the DDL.

pub mod git_commit {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "git_commit")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub repository: String,
        pub branch: String,
        #[sea_orm(unique)]
        pub hash: String,
        pub message: String,
        pub author_name: String,
        pub author_email: String,
        pub author_date: String,
        pub committer_name: String,
        pub committer_email: String,
        pub commit_date: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod git_commit_file {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "git_commit_file")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub commit_hash: String,
        pub path: String,
        pub tech_stack: Option<String>,
        pub hash: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod git_diff_result {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "git_diff_result")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub base_commit_hash: String,
        pub target_commit_hash: String,
        pub base_path: String,
        pub target_path: String,
        pub diff_change_type: String,
        pub base_tech_stack: Option<String>,
        pub target_tech_stack: Option<String>,
        pub base_file_hash: String,
        pub target_file_hash: String,
        pub lines_added: i64,
        pub lines_deleted: i64,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod git_analysis_result {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "git_analysis_result")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        pub commit_hash: String,
        pub path: String,
        /// Descriptor name of the analyzer.
        pub analyzer_type: String,
        pub count: i64,
        pub content: Option<String>, // JSON
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub mod git_file_snapshot {
    use sea_orm::entity::prelude::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
    #[sea_orm(table_name = "git_file_snapshot")]
    pub struct Model {
        #[sea_orm(primary_key)]
        pub id: i32,
        #[sea_orm(unique)]
        pub commit_file_hash: String,
        pub content_snapshot: String,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}
